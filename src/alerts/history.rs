//! Reading the alert log for display.
//!
//! Entries are kept loosely typed: older writers used free-form categories and
//! severities, and one malformed entry must not hide the rest.

use crate::error::Result;
use crate::source::DataSource;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAlert {
    #[serde(skip_deserializing)]
    pub id: String,
    #[serde(default)]
    pub alert_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sensor_value: Option<f64>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Parse the log node into alerts, newest first.
pub fn parse_log(log: &Value) -> Vec<StoredAlert> {
    let Some(entries) = log.as_object() else {
        return Vec::new();
    };

    let mut alerts: Vec<StoredAlert> = entries
        .iter()
        .filter_map(
            |(id, entry)| match serde_json::from_value::<StoredAlert>(entry.clone()) {
                Ok(mut alert) => {
                    alert.id = id.clone();
                    Some(alert)
                }
                Err(e) => {
                    debug!("[Alerts] Skipping malformed log entry {}: {}", id, e);
                    None
                }
            },
        )
        .collect();

    // Push ids break ties between equal timestamps in insertion order.
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    alerts
}

/// Fetch up to `limit` alerts from `path`, newest first.
pub async fn fetch(source: &dyn DataSource, path: &str, limit: usize) -> Result<Vec<StoredAlert>> {
    let log = source.get(path).await?.unwrap_or(Value::Null);
    let mut alerts = parse_log(&log);
    alerts.truncate(limit);
    Ok(alerts)
}
