//! Last-fired times per alert category.
//!
//! [`CooldownLedger`] lives in process memory only: restarting the hub resets
//! every cooldown, and two hub processes keep independent ledgers. A shared
//! store can replace it by implementing [`CooldownStore`].

use super::AlertCategory;
use std::collections::HashMap;

/// Lookup/update interface for cooldown state.
pub trait CooldownStore {
    fn last_fired(&self, category: AlertCategory) -> Option<i64>;
    fn record(&mut self, category: AlertCategory, fired_at: i64);
    fn clear(&mut self);
}

#[derive(Debug, Default)]
pub struct CooldownLedger {
    last_fired: HashMap<AlertCategory, i64>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}

impl CooldownStore for CooldownLedger {
    fn last_fired(&self, category: AlertCategory) -> Option<i64> {
        self.last_fired.get(&category).copied()
    }

    fn record(&mut self, category: AlertCategory, fired_at: i64) {
        self.last_fired.insert(category, fired_at);
    }

    fn clear(&mut self) {
        self.last_fired.clear();
    }
}
