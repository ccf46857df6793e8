//! Appends accepted alerts to the database alert log.
//!
//! Delivery is at-most-once: a failed write is logged and the alert dropped.
//! Nothing is queued or retried, and a failure never blocks later alerts.

use super::AlertEvent;
use crate::error::Result;
use crate::source::DataSource;
use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Write one alert, returning the key it was stored under.
    async fn append(&self, event: &AlertEvent) -> Result<String>;
}

/// Sink writing to the alert log path of a [`DataSource`].
pub struct DatabaseAlertSink {
    source: Arc<dyn DataSource>,
    path: String,
}

impl DatabaseAlertSink {
    pub fn new(source: Arc<dyn DataSource>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl AlertSink for DatabaseAlertSink {
    async fn append(&self, event: &AlertEvent) -> Result<String> {
        let value = serde_json::to_value(event)?;
        self.source.push(&self.path, value).await
    }
}

/// Write every event once, best effort. Returns how many were stored.
pub async fn publish(sink: &dyn AlertSink, events: &[AlertEvent]) -> usize {
    let mut stored = 0;
    for event in events {
        match sink.append(event).await {
            Ok(key) => {
                info!(
                    "[Alerts] {} ({}): {} [{}]",
                    event.category, event.severity, event.message, key
                );
                stored += 1;
            }
            Err(e) => {
                error!(
                    "[Alerts] Dropping {} alert, write failed: {}",
                    event.category, e
                );
            }
        }
    }
    stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertCategory, Severity};
    use crate::error::HubError;
    use crate::source::MemorySource;
    use crate::source::memory::WriteOp;
    use parking_lot::Mutex;

    fn event(category: AlertCategory) -> AlertEvent {
        AlertEvent {
            category,
            severity: Severity::Warning,
            message: "test".into(),
            sensor_value: None,
            timestamp: 1,
        }
    }

    /// Sink failing on selected categories.
    struct FlakySink {
        fail: AlertCategory,
        written: Mutex<Vec<AlertCategory>>,
    }

    #[async_trait]
    impl AlertSink for FlakySink {
        async fn append(&self, event: &AlertEvent) -> Result<String> {
            if event.category == self.fail {
                return Err(HubError::Database {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            self.written.lock().push(event.category);
            Ok("key".into())
        }
    }

    #[tokio::test]
    async fn test_one_push_per_alert() {
        let source = Arc::new(MemorySource::new());
        let sink = DatabaseAlertSink::new(source.clone(), "home/room1/alerts/logs");

        let stored = publish(
            &sink,
            &[event(AlertCategory::Gas), event(AlertCategory::WaterLevel)],
        )
        .await;
        assert_eq!(stored, 2);

        let journal = source.journal();
        assert_eq!(journal.len(), 2);
        assert!(journal.iter().all(|w| w.op == WriteOp::Push));
        assert!(
            journal
                .iter()
                .all(|w| w.path.starts_with("home/room1/alerts/logs/"))
        );

        let log = source.get("home/room1/alerts/logs").await.unwrap().unwrap();
        let first = log.as_object().unwrap().values().next().unwrap();
        assert_eq!(first["alert_type"], "Gas");
        assert_eq!(first["severity"], "warning");
    }

    #[tokio::test]
    async fn test_failed_write_is_dropped_without_blocking_others() {
        let sink = FlakySink {
            fail: AlertCategory::Gas,
            written: Mutex::new(Vec::new()),
        };
        let stored = publish(
            &sink,
            &[
                event(AlertCategory::Gas),
                event(AlertCategory::Rain),
                event(AlertCategory::Battery),
            ],
        )
        .await;
        assert_eq!(stored, 2);
        assert_eq!(
            *sink.written.lock(),
            vec![AlertCategory::Rain, AlertCategory::Battery]
        );
    }
}
