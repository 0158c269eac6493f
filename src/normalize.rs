use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::EtlError;
use crate::models::{NormalizedRecord, RawRecord};

pub fn normalize_record(raw: &RawRecord) -> Result<NormalizedRecord, EtlError> {
    let timestamp = parse_epoch_seconds(&raw.device_id, &raw.time)?;

    let payload: Value = serde_json::from_str(&raw.location)
        .map_err(|e| parse_error(&raw.device_id, "location", e.to_string()))?;
    let mut location = match payload {
        Value::Object(map) => map,
        other => {
            return Err(parse_error(
                &raw.device_id,
                "location",
                format!("expected a JSON object, got {other}"),
            ));
        }
    };
    let latitude = coordinate(&raw.device_id, "latitude", location.remove("latitude"))?;
    let longitude = coordinate(&raw.device_id, "longitude", location.remove("longitude"))?;

    Ok(NormalizedRecord {
        device_id: raw.device_id.clone(),
        temperature: raw.temperature,
        latitude,
        longitude,
        timestamp,
    })
}

/// Normalizes every record, stopping at the first malformed one.
pub fn normalize_all(raw: &[RawRecord]) -> Result<Vec<NormalizedRecord>, EtlError> {
    raw.iter().map(normalize_record).collect()
}

fn parse_epoch_seconds(device_id: &str, time: &str) -> Result<DateTime<Utc>, EtlError> {
    let seconds: i64 = time
        .trim()
        .parse()
        .map_err(|_| parse_error(device_id, "time", format!("'{time}' is not an integer")))?;

    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| parse_error(device_id, "time", format!("{seconds} is out of range")))
}

// Coordinates arrive as numeric strings; plain JSON numbers are accepted too.
fn coordinate(device_id: &str, field: &'static str, value: Option<Value>) -> Result<f64, EtlError> {
    let parsed = match value {
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::Null) | None => {
            return Err(parse_error(device_id, "location", format!("missing {field}")));
        }
        Some(other) => {
            return Err(parse_error(
                device_id,
                "location",
                format!("{field} has unexpected value {other}"),
            ));
        }
    };

    parsed.filter(|v| v.is_finite()).ok_or_else(|| {
        parse_error(device_id, "location", format!("{field} is not a number"))
    })
}

fn parse_error(device_id: &str, field: &'static str, reason: String) -> EtlError {
    EtlError::Parse {
        device_id: device_id.to_string(),
        field,
        reason,
    }
}
