use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Bucket, BucketKey, NormalizedRecord};

const SECONDS_PER_HOUR: i64 = 3600;

/// Zeroes the minute and second fields of a UTC timestamp.
pub fn hour_floor(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let into_hour = timestamp.timestamp().rem_euclid(SECONDS_PER_HOUR);
    let floored = timestamp - Duration::seconds(into_hour);
    floored - Duration::nanoseconds(i64::from(floored.timestamp_subsec_nanos()))
}

pub fn bucket_key(record: &NormalizedRecord) -> BucketKey {
    BucketKey {
        device_id: record.device_id.clone(),
        hour_start: hour_floor(record.timestamp),
    }
}

/// Groups records by device and hour. Keys iterate in (device id, hour)
/// order; each bucket keeps the input order of its records.
pub fn bucket_records(records: Vec<NormalizedRecord>) -> BTreeMap<BucketKey, Bucket> {
    let mut buckets: BTreeMap<BucketKey, Bucket> = BTreeMap::new();

    for record in records {
        let key = bucket_key(&record);
        match buckets.get_mut(&key) {
            Some(bucket) => bucket.push(record),
            None => {
                buckets.insert(key, Bucket::new(record));
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(device_id: &str, h: u32, m: u32, s: u32) -> NormalizedRecord {
        NormalizedRecord {
            device_id: device_id.to_string(),
            temperature: 20.0,
            latitude: 0.0,
            longitude: 0.0,
            timestamp: Utc.with_ymd_and_hms(2023, 6, 18, h, m, s).unwrap(),
        }
    }

    #[test]
    fn floors_to_start_of_hour() {
        let ts = Utc.with_ymd_and_hms(2023, 6, 18, 3, 58, 4).unwrap();
        assert_eq!(hour_floor(ts), Utc.with_ymd_and_hms(2023, 6, 18, 3, 0, 0).unwrap());

        let on_boundary = Utc.with_ymd_and_hms(2023, 6, 18, 4, 0, 0).unwrap();
        assert_eq!(hour_floor(on_boundary), on_boundary);
    }

    #[test]
    fn floors_pre_epoch_timestamps_downwards() {
        let ts = DateTime::from_timestamp(-1, 0).unwrap();
        assert_eq!(hour_floor(ts), DateTime::from_timestamp(-3600, 0).unwrap());
    }

    #[test]
    fn splits_on_hour_boundary() {
        let buckets = bucket_records(vec![
            record("device_1", 3, 0, 0),
            record("device_1", 3, 40, 0),
            record("device_1", 4, 0, 0),
        ]);
        assert_eq!(buckets.len(), 2);
        let sizes: Vec<usize> = buckets.values().map(Bucket::len).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[test]
    fn separates_devices_within_same_hour() {
        let buckets = bucket_records(vec![
            record("device_2", 3, 10, 0),
            record("device_1", 3, 20, 0),
            record("device_2", 3, 30, 0),
        ]);
        let keys: Vec<&str> = buckets.keys().map(|k| k.device_id.as_str()).collect();
        assert_eq!(keys, vec!["device_1", "device_2"]);
        for (key, bucket) in &buckets {
            assert!(bucket.len() > 0);
            assert!(bucket.records().iter().all(|r| r.device_id == key.device_id));
            assert!(bucket
                .records()
                .iter()
                .all(|r| hour_floor(r.timestamp) == key.hour_start));
        }
    }

    #[test]
    fn keeps_arrival_order_within_bucket() {
        let buckets = bucket_records(vec![
            record("device_1", 3, 50, 0),
            record("device_1", 3, 5, 0),
            record("device_1", 3, 30, 0),
        ]);
        let bucket = buckets.values().next().unwrap();
        let minutes: Vec<String> = bucket
            .records()
            .iter()
            .map(|r| r.timestamp.format("%M").to_string())
            .collect();
        assert_eq!(minutes, vec!["50", "05", "30"]);
    }

    #[test]
    fn orders_hours_ascending_per_device() {
        let buckets = bucket_records(vec![
            record("device_1", 5, 0, 0),
            record("device_1", 3, 0, 0),
        ]);
        let hours: Vec<DateTime<Utc>> = buckets.keys().map(|k| k.hour_start).collect();
        assert!(hours[0] < hours[1]);
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        assert!(bucket_records(Vec::new()).is_empty());
    }
}
