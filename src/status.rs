//! Hub online flag at the status path.

use crate::error::Result;
use crate::source::{DataSource, SubscriptionHandle, listen, server_timestamp};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub online: bool,
    /// Epoch milliseconds
    #[serde(rename = "lastSeen", default)]
    pub last_seen: i64,
}

impl DeviceStatus {
    fn parse(value: Option<serde_json::Value>) -> Option<Self> {
        let value = value?;
        match serde_json::from_value(value) {
            Ok(status) => Some(status),
            Err(e) => {
                debug!("[Status] Ignoring malformed status: {}", e);
                None
            }
        }
    }
}

pub struct StatusReporter {
    source: Arc<dyn DataSource>,
    path: String,
}

impl StatusReporter {
    pub fn new(source: Arc<dyn DataSource>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    /// Replace the status node, stamped with the server's clock.
    pub async fn report(&self, online: bool) -> Result<()> {
        self.source
            .set(
                &self.path,
                json!({ "online": online, "lastSeen": server_timestamp() }),
            )
            .await?;
        info!(
            "[Status] Reported {}",
            if online { "online" } else { "offline" }
        );
        Ok(())
    }

    pub async fn read(&self) -> Result<Option<DeviceStatus>> {
        Ok(DeviceStatus::parse(self.source.get(&self.path).await?))
    }

    /// Call `callback` with every status the database reports. Missing or
    /// malformed nodes are skipped.
    pub async fn subscribe<F>(&self, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(DeviceStatus) + Send + Sync + 'static,
    {
        let subscription = self.source.subscribe(&self.path).await?;
        Ok(listen(subscription, move |value| {
            if let Some(status) = DeviceStatus::parse(value) {
                callback(status);
            }
            std::future::ready(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_report_and_read() {
        let source = Arc::new(MemorySource::new());
        let reporter = StatusReporter::new(source.clone(), "home/room1/status");
        assert_eq!(reporter.read().await.unwrap(), None);

        tokio_test::assert_ok!(reporter.report(true).await);
        let status = reporter.read().await.unwrap().unwrap();
        assert!(status.online);
        assert!(status.last_seen > 0);
    }

    #[tokio::test]
    async fn test_subscribe_skips_missing_node() {
        let source = Arc::new(MemorySource::new());
        let reporter = StatusReporter::new(source.clone(), "home/room1/status");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = reporter
            .subscribe(move |status| {
                tx.send(status).ok();
            })
            .await
            .unwrap();

        reporter.report(false).await.unwrap();
        let status = rx.recv().await.unwrap();
        assert!(!status.online);
    }
}
