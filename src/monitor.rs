//! Sensor pipeline: subscription → normalizer → evaluator → alert sink.
//!
//! The evaluator and its cooldown ledger belong to this pipeline alone and
//! are only touched from its listener, one notification at a time. The
//! latest snapshot is published on a `watch` channel for display.
//!
//! Alert delivery runs on its own task after the state lock is released, so
//! a slow or hung sink never holds up the next reading.

use crate::alerts::sink::publish;
use crate::alerts::{AlertEvaluator, AlertEvent, AlertSink};
use crate::clock::now_millis;
use crate::error::Result;
use crate::sensors::{SensorSnapshot, normalize};
use crate::source::{DataSource, SubscriptionHandle, listen};
use log::{debug, info};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

struct PipelineState {
    evaluator: AlertEvaluator,
    previous: Option<SensorSnapshot>,
}

struct Pipeline {
    state: Mutex<PipelineState>,
    sink: Arc<dyn AlertSink>,
    latest: watch::Sender<Option<SensorSnapshot>>,
}

impl Pipeline {
    async fn evaluate(&self, raw: Option<Value>, received_at: i64) -> Vec<AlertEvent> {
        let Some(raw) = raw else {
            debug!("[Sensor] No reading at sensor path");
            return Vec::new();
        };
        let Some(current) = normalize(&raw, received_at) else {
            return Vec::new();
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let events = state
            .evaluator
            .evaluate(state.previous.as_ref(), &current, received_at);
        self.latest.send_replace(Some(current.clone()));
        state.previous = Some(current);
        events
    }

    fn deliver(&self, events: &[AlertEvent]) -> Option<JoinHandle<usize>> {
        if events.is_empty() {
            return None;
        }
        let sink = self.sink.clone();
        let events = events.to_vec();
        Some(tokio::spawn(async move {
            publish(sink.as_ref(), &events).await
        }))
    }
}

pub struct SensorMonitor {
    source: Arc<dyn DataSource>,
    path: String,
    pipeline: Arc<Pipeline>,
}

impl SensorMonitor {
    pub fn new(
        source: Arc<dyn DataSource>,
        path: impl Into<String>,
        evaluator: AlertEvaluator,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            source,
            path: path.into(),
            pipeline: Arc::new(Pipeline {
                state: Mutex::new(PipelineState {
                    evaluator,
                    previous: None,
                }),
                sink,
                latest,
            }),
        }
    }

    /// Receiver of the most recent snapshot; `None` until the first reading.
    pub fn watch(&self) -> watch::Receiver<Option<SensorSnapshot>> {
        self.pipeline.latest.subscribe()
    }

    pub fn latest(&self) -> Option<SensorSnapshot> {
        self.pipeline.latest.borrow().clone()
    }

    /// Feed one raw payload through the pipeline, returning the alerts it
    /// produced. Delivery to the sink continues in the background; the
    /// handle resolves to the number of events written.
    pub async fn process(
        &self,
        raw: Option<Value>,
        received_at: i64,
    ) -> (Vec<AlertEvent>, Option<JoinHandle<usize>>) {
        let events = self.pipeline.evaluate(raw, received_at).await;
        let delivery = self.pipeline.deliver(&events);
        (events, delivery)
    }

    /// Subscribe to the sensor path. Processing stops when the returned
    /// handle is released.
    pub async fn start(&self) -> Result<SubscriptionHandle> {
        let subscription = self.source.subscribe(&self.path).await?;
        info!("[Sensor] Monitoring {}", self.path);

        let pipeline = self.pipeline.clone();
        Ok(listen(subscription, move |raw| {
            let pipeline = pipeline.clone();
            async move {
                let events = pipeline.evaluate(raw, now_millis()).await;
                pipeline.deliver(&events);
            }
        }))
    }
}
