//! Rolling sensor history for charts.
//!
//! The node appends a reading under the history path every few minutes and
//! trims anything older than a day. Older firmware wrote `timestamp` in epoch
//! seconds, newer in milliseconds; both are read as milliseconds here.

use super::snapshot::number;
use crate::error::{HubError, Result};
use crate::source::DataSource;
use log::debug;
use serde::Serialize;
use serde_json::Value;

/// Timestamps below this are taken to be epoch seconds.
const SECONDS_CUTOFF: f64 = 1e12;

const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryRange {
    LastHour,
    Last12Hours,
    #[default]
    Last24Hours,
}

impl HistoryRange {
    pub fn from_hours(hours: u32) -> Result<Self> {
        match hours {
            1 => Ok(Self::LastHour),
            12 => Ok(Self::Last12Hours),
            24 => Ok(Self::Last24Hours),
            other => Err(HubError::Validation(format!(
                "History range must be 1, 12 or 24 hours, not {}",
                other
            ))),
        }
    }

    pub fn hours(self) -> i64 {
        match self {
            Self::LastHour => 1,
            Self::Last12Hours => 12,
            Self::Last24Hours => 24,
        }
    }
}

/// One chart point. Missing metrics read as zero, as the charts plot them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub gas: f64,
    pub pressure: f64,
    pub water_level: f64,
}

pub fn to_millis(timestamp: f64) -> i64 {
    if timestamp < SECONDS_CUTOFF {
        (timestamp * 1000.0) as i64
    } else {
        timestamp as i64
    }
}

fn point(key: &str, entry: &Value) -> Option<HistoryPoint> {
    let Some(fields) = entry.as_object() else {
        debug!("[History] Skipping non-object entry {}", key);
        return None;
    };
    let Some(timestamp) = number(fields, "timestamp") else {
        debug!("[History] Skipping entry {} without timestamp", key);
        return None;
    };
    Some(HistoryPoint {
        timestamp: to_millis(timestamp),
        temperature: number(fields, "temperature").unwrap_or_default(),
        humidity: number(fields, "humidity").unwrap_or_default(),
        gas: number(fields, "gas").unwrap_or_default(),
        pressure: number(fields, "pressure").unwrap_or_default(),
        water_level: number(fields, "waterLevel")
            .or_else(|| number(fields, "WaterLevel"))
            .unwrap_or_default(),
    })
}

/// Parse the history node, oldest first.
pub fn parse(history: &Value) -> Vec<HistoryPoint> {
    let Some(entries) = history.as_object() else {
        return Vec::new();
    };
    let mut points: Vec<HistoryPoint> = entries
        .iter()
        .filter_map(|(key, entry)| point(key, entry))
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

/// Keep the points no older than `range` as of `now` (epoch ms).
pub fn within(points: Vec<HistoryPoint>, range: HistoryRange, now: i64) -> Vec<HistoryPoint> {
    let window = range.hours() * HOUR_MS;
    points
        .into_iter()
        .filter(|p| now.saturating_sub(p.timestamp) <= window)
        .collect()
}

/// Fetch the history at `path` and cut it to `range`.
pub async fn fetch(
    source: &dyn DataSource,
    path: &str,
    range: HistoryRange,
    now: i64,
) -> Result<Vec<HistoryPoint>> {
    let history = source.get(path).await?.unwrap_or(Value::Null);
    Ok(within(parse(&history), range, now))
}
