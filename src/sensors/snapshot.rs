//! Typed sensor readings and the one boundary where raw payloads become them.
//!
//! The microcontroller writes a loosely-typed object to the sensor path. The
//! normalizer maps it to [`SensorSnapshot`] purely structurally: fields that are
//! missing, or carry a value of the wrong shape, stay `None`. Nothing is
//! range-checked or defaulted here.

use chrono::{Local, NaiveDateTime, TimeZone};
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};

/// Format of the `last_update` field written by the microcontroller.
pub const LAST_UPDATE_FORMAT: &str = "%H:%M:%S %d-%m-%Y";

/// One immutable reading of all sensor fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    /// Ambient temperature (°C)
    pub temperature: Option<f64>,
    /// Relative humidity (%)
    pub humidity: Option<f64>,
    /// Barometric pressure (hPa)
    pub pressure: Option<f64>,
    /// Gas concentration (ppm)
    pub gas: Option<f64>,
    pub rain: Option<bool>,
    /// Water tank level (cm)
    pub water_level: Option<f64>,
    pub motion: Option<bool>,
    pub door: Option<f64>,
    pub power: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub battery_percent: Option<f64>,
    /// Device-side time of the reading, `HH:MM:SS DD-MM-YYYY`
    pub last_update: Option<String>,
    /// Capture time in epoch milliseconds
    pub timestamp: i64,
}

impl SensorSnapshot {
    /// Parse `last_update` as local time into epoch milliseconds.
    pub fn last_update_millis(&self) -> Option<i64> {
        self.last_update.as_deref().and_then(parse_last_update)
    }
}

/// Parse a `HH:MM:SS DD-MM-YYYY` local timestamp into epoch milliseconds.
pub fn parse_last_update(text: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), LAST_UPDATE_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Convert a raw sensor payload into a snapshot.
///
/// `received_at` (epoch ms) becomes the timestamp when the payload has none.
/// Returns `None` only when the payload is not an object at all.
pub fn normalize(raw: &Value, received_at: i64) -> Option<SensorSnapshot> {
    let Some(fields) = raw.as_object() else {
        debug!("[Sensor] Ignoring non-object payload: {}", raw);
        return None;
    };

    Some(SensorSnapshot {
        temperature: number(fields, "temperature"),
        humidity: number(fields, "humidity"),
        pressure: number(fields, "pressure"),
        gas: number(fields, "gas"),
        rain: flag(fields, "rain"),
        water_level: number(fields, "WaterLevel"),
        motion: flag(fields, "motion"),
        door: number(fields, "door"),
        power: number(fields, "power"),
        battery_voltage: number(fields, "batteryVoltage"),
        battery_percent: number(fields, "batteryPercent"),
        last_update: fields
            .get("last_update")
            .and_then(Value::as_str)
            .map(str::to_string),
        timestamp: fields
            .get("timestamp")
            .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
            .unwrap_or(received_at),
    })
}

pub(crate) fn number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = fields.get(key)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if parsed.is_none() && !value.is_null() {
        debug!("[Sensor] Field {} has unexpected shape: {}", key, value);
    }
    parsed
}

fn flag(fields: &Map<String, Value>, key: &str) -> Option<bool> {
    match fields.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "detected" | "yes" | "on" => Some(true),
            "false" | "0" | "clear" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_payload() {
        let raw = json!({
            "temperature": 24.5,
            "humidity": 55,
            "pressure": 1012.3,
            "gas": 280,
            "rain": false,
            "WaterLevel": 42.0,
            "motion": "Detected",
            "door": 1,
            "power": 0,
            "batteryVoltage": 3.9,
            "batteryPercent": 81,
            "last_update": "20:45:12 13-12-2025",
            "timestamp": 1_700_000_000_000i64
        });

        let snapshot = normalize(&raw, 5).unwrap();
        assert_eq!(snapshot.temperature, Some(24.5));
        assert_eq!(snapshot.humidity, Some(55.0));
        assert_eq!(snapshot.gas, Some(280.0));
        assert_eq!(snapshot.rain, Some(false));
        assert_eq!(snapshot.water_level, Some(42.0));
        assert_eq!(snapshot.motion, Some(true));
        assert_eq!(snapshot.door, Some(1.0));
        assert_eq!(snapshot.battery_percent, Some(81.0));
        assert_eq!(snapshot.last_update.as_deref(), Some("20:45:12 13-12-2025"));
        assert_eq!(snapshot.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let snapshot = normalize(&json!({"gas": 320}), 10).unwrap();
        assert_eq!(snapshot.gas, Some(320.0));
        assert_eq!(snapshot.temperature, None);
        assert_eq!(snapshot.rain, None);
        assert_eq!(snapshot.water_level, None);
        assert_eq!(snapshot.battery_percent, None);
    }

    #[test]
    fn test_missing_timestamp_uses_receipt_time() {
        let raw = json!({"temperature": 21.0});
        let first = normalize(&raw, 1_700_000_000_000).unwrap();
        let second = normalize(&raw, 1_700_000_005_000).unwrap();
        assert_eq!(first.timestamp, 1_700_000_000_000);
        assert_eq!(second.timestamp - first.timestamp, 5000);
    }

    #[test]
    fn test_no_range_validation() {
        let snapshot = normalize(&json!({"temperature": -400, "humidity": 250}), 0).unwrap();
        assert_eq!(snapshot.temperature, Some(-400.0));
        assert_eq!(snapshot.humidity, Some(250.0));
    }

    #[test]
    fn test_wrong_shapes_become_absent() {
        let snapshot = normalize(
            &json!({"temperature": "warm", "gas": "310", "rain": {"x": 1}}),
            0,
        )
        .unwrap();
        assert_eq!(snapshot.temperature, None);
        assert_eq!(snapshot.gas, Some(310.0));
        assert_eq!(snapshot.rain, None);
    }

    #[test]
    fn test_non_object_payload() {
        assert!(normalize(&json!(42), 0).is_none());
        assert!(normalize(&json!(null), 0).is_none());
    }

    #[test]
    fn test_parse_last_update() {
        let ms = parse_last_update("20:45:12 13-12-2025").unwrap();
        let expected = Local
            .with_ymd_and_hms(2025, 12, 13, 20, 45, 12)
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert_eq!(ms, expected);
        assert!(parse_last_update("garbage").is_none());
        assert!(parse_last_update("20:45 13-12-2025").is_none());
    }
}
