//! Push gateway client for the hosted messaging service.
//!
//! Uses the server-key HTTP API: topic membership through the instance-id
//! service, topic broadcast through the legacy send endpoint.

use super::{PushGateway, PushMessage};
use crate::error::{HubError, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, Url};
use serde_json::{Value, json};

const IID_BASE_URL: &str = "https://iid.googleapis.com/iid/v1";
const SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

pub struct FcmGateway {
    client: Client,
    server_key: String,
    iid_base: Url,
    send_url: Url,
}

impl FcmGateway {
    pub fn new(server_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoints(server_key, IID_BASE_URL, SEND_URL)
    }

    /// Point the gateway at other endpoints, e.g. a local emulator.
    pub fn with_endpoints(
        server_key: impl Into<String>,
        iid_base: &str,
        send_url: &str,
    ) -> Result<Self> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| HubError::InvalidConfig(format!("{}: {}", raw, e)))
        };
        Ok(Self {
            client: Client::new(),
            server_key: server_key.into(),
            iid_base: parse(iid_base)?,
            send_url: parse(send_url)?,
        })
    }

    /// `<iid>/<token>/rel/topics/<topic>`, with both parts escaped.
    pub fn subscribe_url(&self, token: &str, topic: &str) -> Result<Url> {
        let mut url = self.iid_base.clone();
        url.path_segments_mut()
            .map_err(|_| HubError::InvalidConfig(self.iid_base.to_string()))?
            .pop_if_empty()
            .extend([token, "rel", "topics", topic]);
        Ok(url)
    }

    fn authorization(&self) -> String {
        format!("key={}", self.server_key)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HubError::PushGateway(format!("{}: {}", status, body)))
    }
}

/// Request body for a topic broadcast.
pub fn topic_payload(topic: &str, message: &PushMessage) -> Value {
    json!({
        "to": format!("/topics/{}", topic),
        "notification": message.notification,
        "data": message.data,
    })
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn subscribe_to_topic(&self, token: &str, topic: &str) -> Result<()> {
        let response = self
            .client
            .post(self.subscribe_url(token, topic)?)
            .header(AUTHORIZATION, self.authorization())
            .json(&json!({}))
            .send()
            .await?;
        Self::check(response).await?;
        info!("[Push] Subscribed a device to {}", topic);
        Ok(())
    }

    async fn send_to_topic(&self, topic: &str, message: &PushMessage) -> Result<()> {
        let response = self
            .client
            .post(self.send_url.clone())
            .header(AUTHORIZATION, self.authorization())
            .json(&topic_payload(topic, message))
            .send()
            .await?;
        let reply: Value = Self::check(response).await?.json().await?;
        if let Some(error) = reply.get("error").and_then(Value::as_str) {
            return Err(HubError::PushGateway(error.to_string()));
        }
        debug!("[Push] Gateway reply: {}", reply);
        Ok(())
    }
}
