//! Sensor alert evaluation, de-duplication and logging.
//!
//! [`rules`] holds the one canonical threshold table, shared by the
//! [`AlertEvaluator`] and the push notifier. Accepted alerts are appended to
//! the database alert log through an [`AlertSink`].

pub mod evaluator;
pub mod history;
pub mod ledger;
pub mod rules;
pub mod sink;

pub use evaluator::AlertEvaluator;
pub use history::StoredAlert;
pub use ledger::{CooldownLedger, CooldownStore};
pub use sink::{AlertSink, DatabaseAlertSink};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumIter, EnumString};

/// What an alert is about. Serialized with its display name, as shown in the log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum AlertCategory {
    Temperature,
    Humidity,
    #[serde(rename = "Air Quality")]
    #[strum(serialize = "Air Quality")]
    AirQuality,
    Rain,
    #[serde(rename = "Water Level")]
    #[strum(serialize = "Water Level")]
    WaterLevel,
    Gas,
    Battery,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// How snapshots are turned into alerts. One policy per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertPolicy {
    /// Fire when a condition becomes true between two consecutive snapshots.
    Edge,
    /// Fire whenever a condition holds, bounded by the cooldown.
    Level,
}

impl AlertPolicy {
    /// Cooldown used when none is configured. Edge alerts already need the
    /// condition to clear before re-firing, so they run without one.
    pub fn default_cooldown(self) -> Duration {
        match self {
            AlertPolicy::Edge => Duration::ZERO,
            AlertPolicy::Level => Duration::from_secs(60),
        }
    }
}

/// An alert produced by the evaluator, as written to the alert log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "alert_type")]
    pub category: AlertCategory,
    pub severity: Severity,
    pub message: String,
    pub sensor_value: Option<f64>,
    /// Fire time in epoch milliseconds
    pub timestamp: i64,
}
