use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One row of the source `devices` table, exactly as stored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub device_id: String,
    pub temperature: f64,
    pub location: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub device_id: String,
    pub temperature: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// Grouping key for a bucket. Field order gives the output ordering:
/// device id first, then hour.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub device_id: String,
    pub hour_start: DateTime<Utc>,
}

/// Records of one device within one clock hour, in arrival order.
///
/// A bucket always holds at least one record: it can only be created from a
/// first record and grown with `push`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    records: Vec<NormalizedRecord>,
}

impl Bucket {
    pub fn new(first: NormalizedRecord) -> Self {
        Self {
            records: vec![first],
        }
    }

    pub fn push(&mut self, record: NormalizedRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Coordinates as `(latitude, longitude)` pairs in bucket order.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.records().iter().map(|r| (r.latitude, r.longitude))
    }

    /// Stable sort by timestamp; records sharing a second keep arrival order.
    pub fn sort_chronologically(&mut self) {
        self.records.sort_by_key(|r| r.timestamp);
    }

    pub fn max_temperature(&self) -> f64 {
        self.records
            .iter()
            .map(|r| r.temperature)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub device_id: String,
    pub hour_start: DateTime<Utc>,
    pub max_temperature: f64,
    pub sample_count: i64,
    pub total_distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct DeviceTotals {
    pub device_id: String,
    pub hours: usize,
    pub samples: i64,
    pub distance_km: f64,
    pub peak_temperature: f64,
}
