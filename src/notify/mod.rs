//! Push-notification forwarder.
//!
//! Two halves: an HTTP endpoint that subscribes device tokens to the alert
//! topic ([`server`]), and a notifier that broadcasts to that topic when a
//! sensor change crosses an edge rule ([`trigger`]). Delivery itself belongs
//! to the push gateway behind [`PushGateway`].

pub mod fcm;
pub mod server;
pub mod trigger;

pub use fcm::FcmGateway;
pub use trigger::AlertNotifier;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ALERT_TITLE: &str = "IOTMesh Alert 🚨";

#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Register a device token with a topic.
    async fn subscribe_to_topic(&self, token: &str, topic: &str) -> Result<()>;

    /// Broadcast to every device subscribed to `topic`.
    async fn send_to_topic(&self, topic: &str, message: &PushMessage) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub notification: Notification,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn sensor_alert(body: impl Into<String>) -> Self {
        Self {
            notification: Notification {
                title: ALERT_TITLE.to_string(),
                body: body.into(),
            },
            data: BTreeMap::from([("type".to_string(), "sensor-alert".to_string())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensor_alert_payload() {
        let message = PushMessage::sensor_alert("Rain detected");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "notification": {"title": "IOTMesh Alert 🚨", "body": "Rain detected"},
                "data": {"type": "sensor-alert"}
            })
        );
    }
}
