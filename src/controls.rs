//! Actuator control mirror.
//!
//! The database owns actuator state. [`ControlMirror`] only reflects what the
//! database last reported: a write is sent and then forgotten, and the local
//! view changes when the change notification for it arrives, like any other
//! remote change. There is no optimistic update and no echo suppression.

use crate::error::{HubError, Result};
use crate::source::{DataSource, SubscriptionHandle, listen, server_timestamp};
use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// A switchable output on the controller board. The string form is the
/// field name under the controls path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Actuator {
    Light,
    Fan,
    Relay1,
    Relay2,
    Relay3,
    Relay4,
    Lock,
}

impl Actuator {
    /// Parse a user-supplied actuator name.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name.trim()).map_err(|_| HubError::UnknownActuator(name.to_string()))
    }
}

/// Last reported actuator state. Missing fields read as off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub light: bool,
    pub fan: bool,
    pub relay1: bool,
    pub relay2: bool,
    pub relay3: bool,
    pub relay4: bool,
    pub lock: bool,
    /// Time of the last write, epoch ms
    pub timestamp: Option<i64>,
}

impl ControlState {
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(fields) = value.and_then(Value::as_object) else {
            return Self::default();
        };
        let flag = |actuator: Actuator| {
            fields
                .get(&actuator.to_string())
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        Self {
            light: flag(Actuator::Light),
            fan: flag(Actuator::Fan),
            relay1: flag(Actuator::Relay1),
            relay2: flag(Actuator::Relay2),
            relay3: flag(Actuator::Relay3),
            relay4: flag(Actuator::Relay4),
            lock: flag(Actuator::Lock),
            timestamp: fields.get("timestamp").and_then(Value::as_i64),
        }
    }

    pub fn get(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Light => self.light,
            Actuator::Fan => self.fan,
            Actuator::Relay1 => self.relay1,
            Actuator::Relay2 => self.relay2,
            Actuator::Relay3 => self.relay3,
            Actuator::Relay4 => self.relay4,
            Actuator::Lock => self.lock,
        }
    }

    /// `(actuator, on)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (Actuator, bool)> + '_ {
        Actuator::iter().map(move |a| (a, self.get(a)))
    }
}

pub struct ControlMirror {
    source: Arc<dyn DataSource>,
    path: String,
    observed: Arc<RwLock<ControlState>>,
    version: Arc<AtomicU32>,
}

impl ControlMirror {
    pub fn new(source: Arc<dyn DataSource>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
            observed: Arc::new(RwLock::new(ControlState::default())),
            version: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Last state reported by the database.
    pub fn state(&self) -> ControlState {
        self.observed.read().clone()
    }

    /// Number of remote states applied so far.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Fetch the current state from the database.
    pub async fn read(&self) -> Result<ControlState> {
        let value = self.source.get(&self.path).await?;
        let state = ControlState::from_value(value.as_ref());
        apply(&self.observed, &self.version, state.clone());
        Ok(state)
    }

    /// Follow remote changes, calling `callback` after each one is applied.
    pub async fn subscribe<F>(&self, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&ControlState) + Send + Sync + 'static,
    {
        let subscription = self.source.subscribe(&self.path).await?;
        let observed = self.observed.clone();
        let version = self.version.clone();

        Ok(listen(subscription, move |value| {
            let state = ControlState::from_value(value.as_ref());
            debug!("[Controls] Remote state: {:?}", state);
            apply(&observed, &version, state.clone());
            callback(&state);
            std::future::ready(())
        }))
    }

    /// Ask the database to switch `actuator`. The local state is left alone
    /// until the database reports the change back.
    pub async fn write(&self, actuator: Actuator, on: bool) -> Result<()> {
        let mut fields = Map::new();
        fields.insert(actuator.to_string(), Value::Bool(on));
        fields.insert("timestamp".to_string(), server_timestamp());

        self.source.update(&self.path, fields).await?;
        info!(
            "[Controls] Requested {} {}",
            actuator,
            if on { "ON" } else { "OFF" }
        );
        Ok(())
    }
}

fn apply(observed: &RwLock<ControlState>, version: &AtomicU32, state: ControlState) {
    *observed.write() = state;
    version.fetch_add(1, Ordering::SeqCst);
}
