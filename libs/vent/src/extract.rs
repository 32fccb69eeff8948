//! Raw reading extraction
//!
//! The same sensor family publishes several JSON layouts depending on
//! firmware and API version. Each known layout is handled by one strategy;
//! strategies are tried in priority order and the first hit wins.

use alloc::string::String;

use serde_json::{Map, Value};

use crate::error::AcquisitionError;
use crate::reading::RawReading;

/// Twin-channel AQI fields published by the local sensor firmware.
const CHANNEL_AQI_FIELDS: [&str; 2] = ["pm2.5_aqi", "pm2.5_aqi_b"];

/// Single-channel PM2.5 field names, most preferred first.
const PM25_FIELDS: [&str; 5] = ["pm2.5_10minute", "pm2_5_atm", "pm2.5_atm", "pm2.5", "PM2_5Value"];

/// Record keys that may carry a sensor ID.
const ID_FIELDS: [&str; 3] = ["sensor_index", "ID", "id"];

type Strategy = fn(&Value, &[u32]) -> Option<RawReading>;

const STRATEGIES: [(&str, Strategy); 4] = [
    ("channel aqi", channel_aqi),
    ("single pm2.5", single_pm25),
    ("record array", record_array),
    ("nested results", nested_results),
];

/// Runs the strategy chain over `doc`.
///
/// `allow` restricts which records count in the array layouts; an empty
/// list admits every record.
pub fn extract(doc: &Value, allow: &[u32]) -> Option<RawReading> {
    for (name, strategy) in STRATEGIES.iter() {
        if let Some(reading) = strategy(doc, allow) {
            debug!("extract: matched {} layout", name);
            return Some(reading);
        }
    }
    None
}

/// Parses `body` as JSON and runs [`extract`] over it.
pub fn parse_and_extract(body: &[u8], allow: &[u32]) -> Result<RawReading, AcquisitionError> {
    let doc: Value = serde_json::from_slice(body).map_err(|_| AcquisitionError::MalformedPayload)?;
    extract(&doc, allow).ok_or(AcquisitionError::NoUsableData)
}

/// Averages `column` over the rows of a `{ "fields": [...], "data": [[...]] }`
/// table, as returned by the PurpleAir sensors endpoint.
pub fn fields_table_average(doc: &Value, column: &str) -> Result<f64, AcquisitionError> {
    let fields = doc
        .get("fields")
        .and_then(Value::as_array)
        .ok_or(AcquisitionError::MalformedPayload)?;
    let rows = doc
        .get("data")
        .and_then(Value::as_array)
        .ok_or(AcquisitionError::MalformedPayload)?;

    let index = fields
        .iter()
        .position(|f| f.as_str() == Some(column))
        .ok_or(AcquisitionError::NoUsableData)?;

    let mut sum = 0.0;
    let mut count = 0u32;
    for row in rows {
        let Some(row) = row.as_array() else {
            warn!("extract: skipping non-array row");
            continue;
        };
        match row.get(index).and_then(Value::as_f64) {
            Some(value) if value.is_finite() && value >= 0.0 => {
                sum += value;
                count += 1;
            }
            _ => debug!("extract: skipping row without usable {}", column),
        }
    }

    if count == 0 {
        return Err(AcquisitionError::NoUsableData);
    }
    Ok(sum / count as f64)
}

/// A JSON number, or a string holding one, that is finite and non-negative.
fn usable(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (number.is_finite() && number >= 0.0).then_some(number)
}

fn pm25_field(record: &Map<String, Value>) -> Option<f64> {
    PM25_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(usable))
}

fn record_id(record: &Map<String, Value>) -> Option<u32> {
    ID_FIELDS.iter().find_map(|field| {
        let value = record.get(*field)?;
        match value {
            Value::Number(n) => n.as_u64().and_then(|id| u32::try_from(id).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    })
}

fn channel_aqi(doc: &Value, _allow: &[u32]) -> Option<RawReading> {
    let object = doc.as_object()?;
    let mut sum = 0.0;
    let mut count = 0u32;
    for field in CHANNEL_AQI_FIELDS {
        if let Some(value) = object.get(field).and_then(usable) {
            sum += value;
            count += 1;
        }
    }
    (count > 0).then(|| RawReading::Aqi(sum / count as f64))
}

fn single_pm25(doc: &Value, _allow: &[u32]) -> Option<RawReading> {
    let object = doc.as_object()?;
    pm25_field(object)
        .or_else(|| object.get("sensor").and_then(Value::as_object).and_then(pm25_field))
        .map(RawReading::Pm25)
}

fn average_records(records: &[Value], allow: &[u32]) -> Option<RawReading> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for record in records.iter().filter_map(Value::as_object) {
        if !allow.is_empty() {
            match record_id(record) {
                Some(id) if allow.contains(&id) => {}
                _ => continue,
            }
        }
        if let Some(pm) = pm25_field(record) {
            sum += pm;
            count += 1;
        }
    }
    (count > 0).then(|| RawReading::Pm25(sum / count as f64))
}

fn record_array(doc: &Value, allow: &[u32]) -> Option<RawReading> {
    average_records(doc.as_array()?, allow)
}

fn nested_results(doc: &Value, allow: &[u32]) -> Option<RawReading> {
    average_records(doc.get("results")?.as_array()?, allow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approx(reading: Option<RawReading>, expected: RawReading) {
        match (reading, expected) {
            (Some(RawReading::Pm25(a)), RawReading::Pm25(b))
            | (Some(RawReading::Aqi(a)), RawReading::Aqi(b)) => {
                assert!(libm::fabs(a - b) < 1e-9, "{} != {}", a, b)
            }
            (other, _) => panic!("unexpected reading {:?}", other),
        }
    }

    #[test]
    fn test_single_ten_minute_field() {
        let doc = json!({ "pm2.5_10minute": 10.0 });
        assert_eq!(extract(&doc, &[]), Some(RawReading::Pm25(10.0)));
    }

    #[test]
    fn test_channel_aqi_average() {
        let doc = json!({ "pm2.5_aqi": 40, "pm2.5_aqi_b": 50, "pm2_5_atm": 3.0 });
        approx(extract(&doc, &[]), RawReading::Aqi(45.0));

        // One bad channel falls back to the other
        let doc = json!({ "pm2.5_aqi": -1, "pm2.5_aqi_b": 50 });
        approx(extract(&doc, &[]), RawReading::Aqi(50.0));
    }

    #[test]
    fn test_channel_aqi_zero_is_valid() {
        let doc = json!({ "pm2.5_aqi": 0 });
        approx(extract(&doc, &[]), RawReading::Aqi(0.0));
    }

    #[test]
    fn test_single_field_priority() {
        let doc = json!({ "pm2.5": 30.0, "pm2_5_atm": 4.5 });
        assert_eq!(extract(&doc, &[]), Some(RawReading::Pm25(4.5)));
    }

    #[test]
    fn test_nested_sensor_object() {
        let doc = json!({ "api_version": "V1", "sensor": { "sensor_index": 7, "pm2.5_atm": "8.5" } });
        assert_eq!(extract(&doc, &[]), Some(RawReading::Pm25(8.5)));
    }

    #[test]
    fn test_record_array_skips_negative() {
        let doc = json!([
            { "ID": 1, "PM2_5Value": "10.0" },
            { "ID": 2, "PM2_5Value": "-3.0" },
            { "ID": 3, "PM2_5Value": "20.0" },
        ]);
        approx(extract(&doc, &[]), RawReading::Pm25(15.0));
    }

    #[test]
    fn test_record_array_allow_list() {
        let doc = json!([
            { "sensor_index": 1, "pm2.5": 10.0 },
            { "sensor_index": 2, "pm2.5": 90.0 },
            { "sensor_index": 3, "pm2.5": null },
        ]);
        approx(extract(&doc, &[1, 3]), RawReading::Pm25(10.0));
        assert_eq!(extract(&doc, &[3]), None);
    }

    #[test]
    fn test_nested_results() {
        let doc = json!({ "results": [ { "ID": 11, "pm2.5_atm": 4.0 }, { "ID": 12, "pm2.5_atm": 6.0 } ] });
        approx(extract(&doc, &[11, 12]), RawReading::Pm25(5.0));
        approx(extract(&doc, &[12]), RawReading::Pm25(6.0));
    }

    #[test]
    fn test_unknown_shape() {
        assert_eq!(extract(&json!({ "temperature": 21 }), &[]), None);
        assert_eq!(extract(&json!([]), &[]), None);
        assert_eq!(extract(&json!("pm2.5"), &[]), None);
        assert_eq!(extract(&json!({ "pm2.5": "n/a" }), &[]), None);
    }

    #[test]
    fn test_parse_and_extract_errors() {
        assert_eq!(
            parse_and_extract(b"{not json", &[]),
            Err(AcquisitionError::MalformedPayload)
        );
        assert_eq!(
            parse_and_extract(br#"{"humidity": 40}"#, &[]),
            Err(AcquisitionError::NoUsableData)
        );
        assert_eq!(
            parse_and_extract(br#"{"pm2_5_atm": 12.0}"#, &[]),
            Ok(RawReading::Pm25(12.0))
        );
    }

    #[test]
    fn test_fields_table_average() {
        let doc = json!({
            "fields": ["sensor_index", "pm2.5_10minute"],
            "data": [[1, 10.0], [2, null], [3, -1.0], [4], "junk", [5, 20.0]]
        });
        let avg = fields_table_average(&doc, "pm2.5_10minute").unwrap();
        assert!(libm::fabs(avg - 15.0) < 1e-9);
    }

    #[test]
    fn test_fields_table_errors() {
        let doc = json!({ "fields": ["sensor_index"], "data": [[1]] });
        assert_eq!(
            fields_table_average(&doc, "pm2.5_10minute"),
            Err(AcquisitionError::NoUsableData)
        );
        let doc = json!({ "fields": ["sensor_index", "pm2.5_10minute"], "data": [] });
        assert_eq!(
            fields_table_average(&doc, "pm2.5_10minute"),
            Err(AcquisitionError::NoUsableData)
        );
        let doc = json!({ "data": [] });
        assert_eq!(
            fields_table_average(&doc, "pm2.5_10minute"),
            Err(AcquisitionError::MalformedPayload)
        );
    }
}
