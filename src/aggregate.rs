use std::collections::BTreeMap;

use crate::config::BucketOrdering;
use crate::distance::cumulative_distance_km;
use crate::models::{Bucket, BucketKey, DeviceTotals, SummaryRow};

pub fn summarize_bucket(key: &BucketKey, bucket: &Bucket) -> SummaryRow {
    SummaryRow {
        device_id: key.device_id.clone(),
        hour_start: key.hour_start,
        max_temperature: bucket.max_temperature(),
        sample_count: bucket.len() as i64,
        total_distance_km: cumulative_distance_km(bucket.points()),
    }
}

/// One summary row per bucket, in key order.
pub fn aggregate_buckets(
    buckets: BTreeMap<BucketKey, Bucket>,
    ordering: BucketOrdering,
) -> Vec<SummaryRow> {
    buckets
        .into_iter()
        .map(|(key, mut bucket)| {
            if ordering == BucketOrdering::Chronological {
                bucket.sort_chronologically();
            }
            summarize_bucket(&key, &bucket)
        })
        .collect()
}

/// Rolls hourly rows up into one line per device, ordered by device id.
pub fn device_totals(rows: &[SummaryRow]) -> Vec<DeviceTotals> {
    let mut totals: BTreeMap<&str, DeviceTotals> = BTreeMap::new();

    for row in rows {
        let entry = totals
            .entry(row.device_id.as_str())
            .or_insert_with(|| DeviceTotals {
                device_id: row.device_id.clone(),
                hours: 0,
                samples: 0,
                distance_km: 0.0,
                peak_temperature: f64::NEG_INFINITY,
            });

        entry.hours += 1;
        entry.samples += row.sample_count;
        entry.distance_km += row.total_distance_km;
        entry.peak_temperature = entry.peak_temperature.max(row.max_temperature);
    }

    totals.into_values().collect()
}
