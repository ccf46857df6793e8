//! Telegram alert subscribers.

use crate::clock::now_millis;
use crate::error::{HubError, Result};
use crate::source::DataSource;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramSubscriber {
    pub name: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    /// Epoch milliseconds
    #[serde(rename = "createdAt", default)]
    pub created_at: i64,
}

pub struct TelegramSubscribers {
    source: Arc<dyn DataSource>,
    path: String,
}

impl TelegramSubscribers {
    pub fn new(source: Arc<dyn DataSource>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    /// Store a subscriber, returning its key.
    pub async fn register(&self, name: &str, chat_id: &str) -> Result<String> {
        if name.trim().is_empty() || chat_id.trim().is_empty() {
            return Err(HubError::Validation(
                "Name and Chat ID are required".to_string(),
            ));
        }
        let subscriber = TelegramSubscriber {
            name: name.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
            created_at: now_millis(),
        };
        let key = self
            .source
            .push(&self.path, serde_json::to_value(&subscriber)?)
            .await?;
        info!("[Telegram] Saved subscriber {}", subscriber.name);
        Ok(key)
    }

    /// Registered subscribers, oldest first.
    pub async fn list(&self) -> Result<Vec<TelegramSubscriber>> {
        let Some(Value::Object(entries)) = self.source.get(&self.path).await? else {
            return Ok(Vec::new());
        };
        let mut subscribers: Vec<TelegramSubscriber> = entries
            .into_iter()
            .filter_map(|(_, entry)| serde_json::from_value(entry).ok())
            .collect();
        subscribers.sort_by_key(|s| s.created_at);
        Ok(subscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[tokio::test]
    async fn test_register_requires_both_fields() {
        let source = Arc::new(MemorySource::new());
        let subscribers = TelegramSubscribers::new(source.clone(), "telegram/subscribers");

        for (name, chat) in [("", "123"), ("Asha", " "), ("", "")] {
            let err = subscribers.register(name, chat).await.unwrap_err();
            assert_eq!(err.to_string(), "Name and Chat ID are required");
        }
        assert!(source.journal().is_empty());
    }

    #[tokio::test]
    async fn test_register_wire_format() {
        let source = Arc::new(MemorySource::new());
        let subscribers = TelegramSubscribers::new(source.clone(), "telegram/subscribers");
        let key = tokio_test::assert_ok!(subscribers.register("Asha", "55501").await);

        let stored = source
            .get(&format!("telegram/subscribers/{}", key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["name"], "Asha");
        assert_eq!(stored["chatId"], "55501");
        assert!(stored["createdAt"].as_i64().unwrap() > 0);

        let listed = subscribers.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].chat_id, "55501");
    }
}
