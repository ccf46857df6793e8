//! Hosted realtime database over its REST API.
//!
//! Point operations map to `GET`/`PUT`/`PATCH`/`POST`/`DELETE` on
//! `<url>/<path>.json`. Subscriptions open a `text/event-stream` request on the
//! same URL; the server sends `put`/`patch` events relative to the watched
//! path, which are folded into a local copy of the subtree so subscribers
//! always receive the whole value.

use super::sse::{SseDecoder, SseEvent};
use super::tree;
use super::{DataSource, Subscription};
use crate::config::DatabaseConfig;
use crate::error::{HubError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Delay before reopening a failed event stream.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// What a stream event did to the local copy.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamAction {
    Changed,
    KeepAlive,
    Ignored,
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

/// Fold one server-sent event into `cache` (the watched subtree).
pub fn apply_event(cache: &mut Value, event: &SseEvent) -> Result<StreamAction> {
    match event.event.as_str() {
        "put" => {
            let update: PathData = serde_json::from_str(&event.data)?;
            tree::set_at(cache, &tree::segments(&update.path), update.data);
            Ok(StreamAction::Changed)
        }
        "patch" => {
            let update: PathData = serde_json::from_str(&event.data)?;
            match update.data {
                Value::Object(fields) => {
                    tree::merge_at(cache, &tree::segments(&update.path), fields);
                    Ok(StreamAction::Changed)
                }
                other => Err(HubError::Stream(format!(
                    "patch without object payload: {}",
                    other
                ))),
            }
        }
        "keep-alive" => Ok(StreamAction::KeepAlive),
        "cancel" => Err(HubError::Stream(format!(
            "stream cancelled by server: {}",
            event.data
        ))),
        "auth_revoked" => Err(HubError::Stream("credential expired".to_string())),
        other => {
            debug!("[Stream] Ignoring event type {}", other);
            Ok(StreamAction::Ignored)
        }
    }
}

/// Why a single stream connection ended.
enum StreamEnd {
    Cancelled,
    Closed,
}

pub struct FirebaseSource {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl FirebaseSource {
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        Url::parse(&config.url)
            .map_err(|e| HubError::InvalidConfig(format!("database url {}: {}", config.url, e)))?;
        Ok(Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    /// REST endpoint for `path`.
    pub fn url(&self, path: &str) -> Result<Url> {
        tree::validate_path(path)?;
        let raw = format!("{}/{}.json", self.base_url, tree::segments(path).join("/"));
        let mut url =
            Url::parse(&raw).map_err(|e| HubError::InvalidPath(format!("{}: {}", path, e)))?;
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(HubError::Database {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DataSource for FirebaseSource {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.url(path)?)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let value: Value = Self::check(response).await?.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let response = self
            .client
            .put(self.url(path)?)
            .json(&value)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        let response = self
            .client
            .patch(self.url(path)?)
            .json(&fields)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(&value)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let pushed: PushResponse = Self::check(response).await?.json().await?;
        Ok(pushed.name)
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path)?)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let url = self.url(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let stream = EventStream {
            client: self.client.clone(),
            url,
            path: path.to_string(),
            tx,
            cancel: cancel.clone(),
            last_sent: None,
        };
        tokio::spawn(stream.run());

        Ok(Subscription::new(path, rx, cancel))
    }
}

/// Background task feeding one subscription.
struct EventStream {
    client: Client,
    url: Url,
    path: String,
    tx: mpsc::UnboundedSender<Option<Value>>,
    cancel: CancellationToken,
    /// `None` until the first value has been delivered.
    last_sent: Option<Option<Value>>,
}

impl EventStream {
    async fn run(mut self) {
        info!("[Stream] Watching {}", self.path);

        loop {
            match self.connect().await {
                Ok(StreamEnd::Cancelled) => break,
                Ok(StreamEnd::Closed) => {
                    warn!("[Stream] {} closed by server, reconnecting", self.path);
                }
                Err(e) => {
                    error!("[Stream] {} failed: {}", self.path, e);
                }
            }

            // Wait before reconnecting
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }

        debug!("[Stream] Stopped watching {}", self.path);
    }

    async fn connect(&mut self) -> Result<StreamEnd> {
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            response = self
                .client
                .get(self.url.clone())
                .header(ACCEPT, "text/event-stream")
                .send() => response?,
        };
        let response = FirebaseSource::check(response).await?;
        let mut body = response.bytes_stream();

        // Every connection starts with a full `put` of the subtree.
        let mut cache = Value::Null;
        let mut decoder = SseDecoder::new();

        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                chunk = body.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(StreamEnd::Closed),
            };

            for event in decoder.feed(&bytes) {
                if apply_event(&mut cache, &event)? == StreamAction::Changed
                    && !self.deliver(&cache)
                {
                    return Ok(StreamEnd::Cancelled);
                }
            }
        }
    }

    /// Send the subtree if it differs from what the subscriber last saw.
    /// Returns false once the subscriber is gone.
    fn deliver(&mut self, cache: &Value) -> bool {
        let current = if cache.is_null() {
            None
        } else {
            Some(cache.clone())
        };
        if self.last_sent.as_ref() == Some(&current) {
            return true;
        }
        self.last_sent = Some(current.clone());
        self.tx.send(current).is_ok()
    }
}
