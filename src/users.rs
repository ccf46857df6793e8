//! Login history under the users path.

use crate::error::{HubError, Result};
use crate::session::{LoginRecord, Session};
use crate::source::DataSource;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(skip_deserializing)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub timestamp: i64,
}

pub struct UserDirectory {
    source: Arc<dyn DataSource>,
    path: String,
}

impl UserDirectory {
    pub fn new(source: Arc<dyn DataSource>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    pub async fn record_login(&self, record: &LoginRecord) -> Result<String> {
        self.source
            .push(&self.path, serde_json::to_value(record)?)
            .await
    }

    /// Every recorded login, newest first.
    pub async fn list(&self) -> Result<Vec<UserRecord>> {
        let Some(Value::Object(entries)) = self.source.get(&self.path).await? else {
            return Ok(Vec::new());
        };

        let mut users: Vec<UserRecord> = entries
            .into_iter()
            .filter_map(|(id, entry)| {
                let mut user: UserRecord = serde_json::from_value(entry)
                    .map_err(|e| debug!("[Users] Skipping malformed entry {}: {}", id, e))
                    .ok()?;
                user.id = id;
                Some(user)
            })
            .collect();
        users.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(users)
    }

    /// Delete one entry. Only admins may; anyone else is refused before any
    /// request is made.
    pub async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        if !session.is_admin() {
            return Err(HubError::PermissionDenied(
                "Only admin can delete users!".to_string(),
            ));
        }
        let id = id.trim();
        if id.is_empty() || id.contains('/') {
            return Err(HubError::InvalidPath(id.to_string()));
        }
        self.source
            .remove(&format!("{}/{}", self.path, id))
            .await?;
        info!("[Users] Deleted {}", id);
        Ok(())
    }
}
