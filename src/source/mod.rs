//! Realtime data source: the hosted key-tree database and its local stand-in.
//!
//! Everything else in the crate talks to the database through [`DataSource`],
//! so the hosted backend ([`FirebaseSource`]) and the in-process simulator
//! ([`MemorySource`]) are interchangeable.

pub mod firebase;
pub mod memory;
pub mod push_id;
pub mod sse;
pub mod tree;

pub use firebase::FirebaseSource;
pub use memory::MemorySource;
pub use tree::server_timestamp;

use crate::error::Result;
use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Point reads, writes and live change subscriptions on slash-separated paths.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Read the node at `path`; `None` when it does not exist.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replace the node at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Merge `fields` into the node at `path`, leaving other children untouched.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()>;

    /// Append `value` under a generated, insertion-ordered key and return the key.
    async fn push(&self, path: &str, value: Value) -> Result<String>;

    /// Delete the node at `path`.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Watch `path`. The current value is delivered first, then one value per
    /// committed change, in commit order for this path.
    async fn subscribe(&self, path: &str) -> Result<Subscription>;
}

/// A live change stream for one path.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// cancels it; the source stops feeding it and releases its resources.
pub struct Subscription {
    path: String,
    rx: mpsc::UnboundedReceiver<Option<Value>>,
    cancel: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        path: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Option<Value>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            path: path.into(),
            rx,
            cancel,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next value. `None` once the subscription is cancelled or
    /// the source has gone away; `Some(None)` when the node does not exist.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            value = self.rx.recv() => value,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the stream now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Releasing subscription on {}", self.path);
        self.cancel.cancel();
    }
}

/// Handle to a callback-driven subscription started with [`listen`].
///
/// Released on drop. A callback already running when the handle is released
/// finishes; no further callbacks are started.
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Wait until the listener task has exited.
    pub async fn closed(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drive `callback` with every value of `subscription` on a background task.
pub fn listen<F, Fut>(mut subscription: Subscription, mut callback: F) -> SubscriptionHandle
where
    F: FnMut(Option<Value>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = subscription.cancel_token();
    let task = tokio::spawn(async move {
        while let Some(value) = subscription.next().await {
            callback(value).await;
        }
    });
    SubscriptionHandle {
        cancel,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_subscription_ends_after_unsubscribe() {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut sub = Subscription::new("a", rx, cancel.clone());

        tx.send(Some(json!(1))).unwrap();
        assert_eq!(sub.next().await, Some(Some(json!(1))));

        sub.unsubscribe();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_listen_stops_invoking_callback_after_release() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = Subscription::new("a", rx, CancellationToken::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let handle = listen(sub, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tx.send(Some(json!(1))).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(handle);
        tx.send(Some(json!(2))).ok();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
