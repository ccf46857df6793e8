//! Broadcasts a push notification when a sensor change crosses an edge rule.
//!
//! Only changes count: the first reading after startup sets the baseline.
//! When several rules cross in one change, only the first in table order is
//! sent.
//!
//! Bodies are the same rule messages the alert log stores (for example
//! "Water tank low: 15 cm"), so a push and its log entry always read alike.

use super::{PushGateway, PushMessage};
use crate::alerts::rules::EDGE_RULES;
use crate::clock::now_millis;
use crate::error::Result;
use crate::sensors::{SensorSnapshot, normalize};
use crate::source::{DataSource, SubscriptionHandle, listen};
use log::{error, info};
use parking_lot::Mutex;
use std::sync::Arc;

/// Message for the change `before` → `after`, if any edge rule crossed.
pub fn message_for(before: &SensorSnapshot, after: &SensorSnapshot) -> Option<PushMessage> {
    EDGE_RULES
        .iter()
        .find(|rule| rule.fires_edge(before, after))
        .map(|rule| PushMessage::sensor_alert(rule.message(after)))
}

pub struct AlertNotifier {
    gateway: Arc<dyn PushGateway>,
    topic: String,
}

impl AlertNotifier {
    pub fn new(gateway: Arc<dyn PushGateway>, topic: impl Into<String>) -> Self {
        Self {
            gateway,
            topic: topic.into(),
        }
    }

    /// Send the notification for one change. Returns whether one was sent.
    pub async fn on_change(&self, before: &SensorSnapshot, after: &SensorSnapshot) -> Result<bool> {
        let Some(message) = message_for(before, after) else {
            return Ok(false);
        };
        self.gateway.send_to_topic(&self.topic, &message).await?;
        info!("[Push] Notification sent: {}", message.notification.body);
        Ok(true)
    }

    /// Follow the sensor path until the handle is released.
    pub async fn start(
        self: Arc<Self>,
        source: &dyn DataSource,
        path: &str,
    ) -> Result<SubscriptionHandle> {
        let subscription = source.subscribe(path).await?;
        let previous: Arc<Mutex<Option<SensorSnapshot>>> = Arc::new(Mutex::new(None));

        Ok(listen(subscription, move |raw| {
            let notifier = self.clone();
            let previous = previous.clone();
            async move {
                let Some(after) = raw.and_then(|raw| normalize(&raw, now_millis())) else {
                    return;
                };
                let before = previous.lock().replace(after.clone());
                if let Some(before) = before
                    && let Err(e) = notifier.on_change(&before, &after).await
                {
                    error!("[Push] Broadcast failed: {}", e);
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(String, PushMessage)>>,
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn subscribe_to_topic(&self, _token: &str, _topic: &str) -> Result<()> {
            Ok(())
        }

        async fn send_to_topic(&self, topic: &str, message: &PushMessage) -> Result<()> {
            self.sent.lock().push((topic.to_string(), message.clone()));
            Ok(())
        }
    }

    fn snapshot(raw: serde_json::Value) -> SensorSnapshot {
        normalize(&raw, 0).unwrap()
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let before = snapshot(json!({"gas": 280, "WaterLevel": 25, "rain": false}));
        let after = snapshot(json!({"gas": 320, "WaterLevel": 15, "rain": true}));
        let message = message_for(&before, &after).unwrap();
        assert_eq!(message.notification.body, "High gas level: 320 PPM");
        assert_eq!(message.notification.title, "IOTMesh Alert 🚨");

        let after = snapshot(json!({"gas": 280, "WaterLevel": 15, "rain": true}));
        assert_eq!(
            message_for(&before, &after).unwrap().notification.body,
            "Water tank low: 15 cm"
        );

        let after = snapshot(json!({"gas": 280, "WaterLevel": 25, "rain": true}));
        assert_eq!(
            message_for(&before, &after).unwrap().notification.body,
            "Rain detected"
        );
    }

    #[test]
    fn test_no_crossing_no_message() {
        let before = snapshot(json!({"gas": 320, "batteryPercent": 15}));
        let after = snapshot(json!({"gas": 330, "batteryPercent": 10}));
        assert_eq!(message_for(&before, &after), None);

        let before = snapshot(json!({"batteryPercent": 25}));
        let after = snapshot(json!({"batteryPercent": 19}));
        assert_eq!(
            message_for(&before, &after).unwrap().notification.body,
            "Battery critically low: 19 %"
        );
    }

    #[tokio::test]
    async fn test_notifier_follows_changes_only() {
        let source = MemorySource::new();
        source
            .set("home/room1/sensor", json!({"gas": 320}))
            .await
            .unwrap();

        let gateway = Arc::new(RecordingGateway::default());
        let notifier = Arc::new(AlertNotifier::new(gateway.clone(), "iotmesh-alerts"));
        let _handle = notifier.start(&source, "home/room1/sensor").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gateway.sent.lock().is_empty());

        source.set("home/room1/sensor/gas", json!(250)).await.unwrap();
        source.set("home/room1/sensor/gas", json!(310)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sent = gateway.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "iotmesh-alerts");
        assert_eq!(sent[0].1.data["type"], "sensor-alert");
    }
}
