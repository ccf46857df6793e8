//! In-process realtime database.
//!
//! Same observable semantics as the hosted database: writes notify every
//! subscriber whose path is an ancestor or descendant of the written path,
//! subscribers only hear about values that actually changed, push keys sort
//! in insertion order and server timestamp placeholders resolve on write.
//! Used by tests and the `simulate` command.

use super::push_id::PushIdGenerator;
use super::tree;
use super::{DataSource, Subscription};
use crate::clock::now_millis;
use crate::error::Result;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Kind of write recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Set,
    Update,
    Push,
    Remove,
}

/// One write as it reached the source.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub path: String,
}

struct Watcher {
    path: Vec<String>,
    tx: mpsc::UnboundedSender<Option<Value>>,
    cancel: CancellationToken,
    last: Option<Value>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    watchers: Vec<Watcher>,
    push_ids: PushIdGenerator,
    journal: Vec<WriteRecord>,
}

impl Inner {
    fn write(&mut self, op: WriteOp, path: &str, apply: impl FnOnce(&mut Value)) {
        apply(&mut self.root);
        self.journal.push(WriteRecord {
            op,
            path: path.to_string(),
        });
        self.fan_out(&tree::segments(path));
    }

    fn fan_out(&mut self, written: &[&str]) {
        self.watchers
            .retain(|w| !w.cancel.is_cancelled() && !w.tx.is_closed());

        let root = &self.root;
        for watcher in self.watchers.iter_mut() {
            if !tree::related(&watcher.path, written) {
                continue;
            }
            let current = tree::get_at(root, &watcher.path).cloned();
            if current != watcher.last {
                watcher.last = current.clone();
                let _ = watcher.tx.send(current);
            }
        }
    }
}

#[derive(Default)]
pub struct MemorySource {
    inner: Mutex<Inner>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree.
    pub fn with_root(root: Value) -> Self {
        let source = Self::new();
        source.inner.lock().root = tree::prune(root);
        source
    }

    /// Every write accepted so far, oldest first.
    pub fn journal(&self) -> Vec<WriteRecord> {
        self.inner.lock().journal.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner
            .watchers
            .retain(|w| !w.cancel.is_cancelled() && !w.tx.is_closed());
        inner.watchers.len()
    }

    /// Snapshot of the whole tree.
    pub fn dump(&self) -> Value {
        self.inner.lock().root.clone()
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        tree::validate_path(path)?;
        let inner = self.inner.lock();
        Ok(tree::get_at(&inner.root, &tree::segments(path)).cloned())
    }

    async fn set(&self, path: &str, mut value: Value) -> Result<()> {
        tree::validate_path(path)?;
        tree::resolve_server_values(&mut value, now_millis());
        self.inner.lock().write(WriteOp::Set, path, |root| {
            tree::set_at(root, &tree::segments(path), value)
        });
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        tree::validate_path(path)?;
        let mut fields = Value::Object(fields);
        tree::resolve_server_values(&mut fields, now_millis());
        let Value::Object(fields) = fields else {
            return Ok(());
        };
        self.inner.lock().write(WriteOp::Update, path, |root| {
            tree::merge_at(root, &tree::segments(path), fields)
        });
        Ok(())
    }

    async fn push(&self, path: &str, mut value: Value) -> Result<String> {
        tree::validate_path(path)?;
        let now = now_millis();
        tree::resolve_server_values(&mut value, now);

        let mut inner = self.inner.lock();
        let key = inner.push_ids.next_id(now, &mut rand::thread_rng());
        let child = format!("{}/{}", path.trim_end_matches('/'), key);
        inner.write(WriteOp::Push, &child, |root| {
            tree::set_at(root, &tree::segments(&child), value)
        });
        debug!("Pushed {} under {}", key, path);
        Ok(key)
    }

    async fn remove(&self, path: &str) -> Result<()> {
        tree::validate_path(path)?;
        self.inner.lock().write(WriteOp::Remove, path, |root| {
            tree::set_at(root, &tree::segments(path), Value::Null)
        });
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        tree::validate_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let segments: Vec<String> = tree::segments(path)
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut inner = self.inner.lock();
        let current = tree::get_at(&inner.root, &segments).cloned();
        let _ = tx.send(current.clone());
        inner.watchers.push(Watcher {
            path: segments,
            tx,
            cancel: cancel.clone(),
            last: current,
        });

        Ok(Subscription::new(path, rx, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set_remove() {
        let source = MemorySource::new();
        assert_eq!(source.get("home/room1/sensor").await.unwrap(), None);

        source
            .set("home/room1/sensor", json!({"temperature": 21.5}))
            .await
            .unwrap();
        assert_eq!(
            source.get("home/room1/sensor/temperature").await.unwrap(),
            Some(json!(21.5))
        );

        source.remove("home/room1/sensor").await.unwrap();
        assert_eq!(source.get("home").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_value_first() {
        let source = MemorySource::with_root(json!({"a": {"b": 1}}));
        let mut sub = source.subscribe("a").await.unwrap();
        assert_eq!(sub.next().await, Some(Some(json!({"b": 1}))));

        let mut missing = source.subscribe("nothing/here").await.unwrap();
        assert_eq!(missing.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_fan_out_to_ancestors_and_descendants_only() {
        let source = MemorySource::new();
        let mut parent = source.subscribe("home").await.unwrap();
        let mut child = source.subscribe("home/room1/controls/light").await.unwrap();
        let mut other = source.subscribe("telegram").await.unwrap();
        assert_eq!(parent.next().await, Some(None));
        assert_eq!(child.next().await, Some(None));
        assert_eq!(other.next().await, Some(None));

        source
            .set("home/room1/controls", json!({"light": true}))
            .await
            .unwrap();

        assert_eq!(
            parent.next().await,
            Some(Some(json!({"room1": {"controls": {"light": true}}})))
        );
        assert_eq!(child.next().await, Some(Some(json!(true))));

        // Nothing was written under telegram.
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), other.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_unchanged_values_are_not_redelivered() {
        let source = MemorySource::new();
        source.set("controls/light", json!(true)).await.unwrap();
        let mut light = source.subscribe("controls/light").await.unwrap();
        assert_eq!(light.next().await, Some(Some(json!(true))));

        source.set("controls/fan", json!(true)).await.unwrap();
        source.set("controls/light", json!(false)).await.unwrap();
        assert_eq!(light.next().await, Some(Some(json!(false))));
    }

    #[tokio::test]
    async fn test_update_merges_and_resolves_server_timestamp() {
        let source = MemorySource::with_root(json!({"controls": {"fan": true}}));
        let mut fields = Map::new();
        fields.insert("light".into(), json!(true));
        fields.insert("timestamp".into(), tree::server_timestamp());
        source.update("controls", fields).await.unwrap();

        let controls = source.get("controls").await.unwrap().unwrap();
        assert_eq!(controls["fan"], json!(true));
        assert_eq!(controls["light"], json!(true));
        assert!(controls["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_push_keys_sort_in_insertion_order() {
        let source = MemorySource::new();
        let mut keys = Vec::new();
        for i in 0..5 {
            keys.push(source.push("alerts/logs", json!({"n": i})).await.unwrap());
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let logs = source.get("alerts/logs").await.unwrap().unwrap();
        assert_eq!(logs.as_object().unwrap().len(), 5);
        assert_eq!(source.journal().len(), 5);
        assert!(source.journal().iter().all(|w| w.op == WriteOp::Push));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_released() {
        let source = MemorySource::new();
        let sub = source.subscribe("home").await.unwrap();
        assert_eq!(source.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_path_is_rejected() {
        let source = MemorySource::new();
        assert!(source.set("home/room.1", json!(1)).await.is_err());
        assert!(source.journal().is_empty());
    }
}
