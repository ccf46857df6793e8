//! Decides which alerts a new snapshot produces.
//!
//! Evaluation is deterministic: given the previous snapshot, the current one,
//! the ledger state and `now`, the returned events are always the same. The
//! only side effect is recording accepted events in the ledger.

use super::ledger::{CooldownLedger, CooldownStore};
use super::rules::{Rule, rules_for};
use super::{AlertEvent, AlertPolicy};
use crate::sensors::SensorSnapshot;
use log::debug;
use std::time::Duration;

pub struct AlertEvaluator<L: CooldownStore = CooldownLedger> {
    policy: AlertPolicy,
    cooldown: Duration,
    ledger: L,
}

impl AlertEvaluator<CooldownLedger> {
    pub fn new(policy: AlertPolicy, cooldown: Duration) -> Self {
        Self::with_ledger(policy, cooldown, CooldownLedger::new())
    }
}

impl<L: CooldownStore> AlertEvaluator<L> {
    pub fn with_ledger(policy: AlertPolicy, cooldown: Duration, ledger: L) -> Self {
        Self {
            policy,
            cooldown,
            ledger,
        }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Evaluate `current` (and, for edge policy, the transition from
    /// `previous`) at time `now` (epoch ms).
    ///
    /// Under the edge policy nothing fires without a previous snapshot.
    pub fn evaluate(
        &mut self,
        previous: Option<&SensorSnapshot>,
        current: &SensorSnapshot,
        now: i64,
    ) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        for rule in rules_for(self.policy) {
            let triggered = match self.policy {
                AlertPolicy::Level => rule.fires_level(current),
                AlertPolicy::Edge => previous.is_some_and(|prev| rule.fires_edge(prev, current)),
            };
            if !triggered {
                continue;
            }
            if !self.admit(rule, now) {
                debug!("[Alerts] {} suppressed by cooldown", rule.category);
                continue;
            }
            events.push(rule.event(current, now));
        }

        events
    }

    fn admit(&mut self, rule: &Rule, now: i64) -> bool {
        let window = i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX);
        if let Some(last) = self.ledger.last_fired(rule.category)
            && now.saturating_sub(last) < window
        {
            return false;
        }
        self.ledger.record(rule.category, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertCategory, Severity};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    fn reading(gas: f64, water: f64) -> SensorSnapshot {
        SensorSnapshot {
            gas: Some(gas),
            water_level: Some(water),
            ..Default::default()
        }
    }

    fn random_snapshot(rng: &mut StdRng) -> SensorSnapshot {
        SensorSnapshot {
            temperature: Some(rng.gen_range(20.0..40.0)),
            humidity: Some(rng.gen_range(10.0..60.0)),
            gas: Some(rng.gen_range(200.0..500.0)),
            rain: Some(rng.gen_bool(0.5)),
            water_level: Some(rng.gen_range(5.0..40.0)),
            battery_percent: Some(rng.gen_range(5.0..40.0)),
            ..Default::default()
        }
    }

    #[test]
    fn test_gas_and_water_transition_emits_two_warnings() {
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Edge, Duration::ZERO);
        let previous = reading(280.0, 25.0);
        let current = reading(320.0, 15.0);

        let events = evaluator.evaluate(Some(&previous), &current, 1_000);
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].category, AlertCategory::Gas);
        assert_eq!(events[0].severity, Severity::Warning);
        assert_eq!(events[0].message, "High gas level: 320 PPM");
        assert_eq!(events[0].sensor_value, Some(320.0));

        assert_eq!(events[1].category, AlertCategory::WaterLevel);
        assert_eq!(events[1].severity, Severity::Warning);
        assert_eq!(events[1].message, "Water tank low: 15 cm");
    }

    #[test]
    fn test_redelivered_snapshot_emits_nothing() {
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Edge, Duration::ZERO);
        let previous = reading(280.0, 25.0);
        let current = reading(320.0, 15.0);

        assert_eq!(evaluator.evaluate(Some(&previous), &current, 1_000).len(), 2);
        assert!(evaluator.evaluate(Some(&current), &current, 1_001).is_empty());
    }

    #[test]
    fn test_edge_without_previous_snapshot_is_silent() {
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Edge, Duration::ZERO);
        assert!(evaluator.evaluate(None, &reading(999.0, 0.0), 0).is_empty());
    }

    #[test]
    fn test_edge_fires_iff_condition_crosses() {
        let mut rng = StdRng::seed_from_u64(0x10_7e54);
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Edge, Duration::ZERO);
        let mut previous = random_snapshot(&mut rng);

        for step in 0..500 {
            let current = random_snapshot(&mut rng);
            let events = evaluator.evaluate(Some(&previous), &current, step * 1_000);

            for rule in rules_for(AlertPolicy::Edge) {
                let expected = rule.condition.holds(&previous) == Some(false)
                    && rule.condition.holds(&current) == Some(true);
                let emitted = events.iter().any(|e| e.category == rule.category);
                assert_eq!(expected, emitted, "rule {:?} at step {}", rule.category, step);
            }
            previous = current;
        }
    }

    #[test]
    fn test_level_repeats_only_after_cooldown() {
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Level, Duration::from_secs(60));
        let hot = SensorSnapshot {
            temperature: Some(35.0),
            ..Default::default()
        };

        assert_eq!(evaluator.evaluate(None, &hot, 0).len(), 1);
        assert!(evaluator.evaluate(None, &hot, 30_000).is_empty());
        assert!(evaluator.evaluate(None, &hot, 59_999).is_empty());
        assert_eq!(evaluator.evaluate(None, &hot, 60_000).len(), 1);
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let mut evaluator =
            AlertEvaluator::new(AlertPolicy::Level, Duration::from_secs(u64::MAX));
        let hot = SensorSnapshot {
            temperature: Some(35.0),
            ..Default::default()
        };

        assert_eq!(evaluator.evaluate(None, &hot, 0).len(), 1);
        assert!(evaluator.evaluate(None, &hot, 60_000).is_empty());
        assert!(evaluator.evaluate(None, &hot, i64::MAX).is_empty());
    }

    #[test]
    fn test_level_rules_and_severities() {
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Level, Duration::from_secs(60));
        let bad = SensorSnapshot {
            temperature: Some(31.0),
            humidity: Some(25.0),
            gas: Some(460.0),
            rain: Some(true),
            water_level: Some(10.0),
            ..Default::default()
        };

        let events = evaluator.evaluate(None, &bad, 0);
        let by_category: HashMap<AlertCategory, Severity> =
            events.iter().map(|e| (e.category, e.severity)).collect();
        assert_eq!(by_category.len(), 5);
        assert_eq!(by_category[&AlertCategory::Temperature], Severity::Warning);
        assert_eq!(by_category[&AlertCategory::Humidity], Severity::Warning);
        assert_eq!(by_category[&AlertCategory::AirQuality], Severity::Error);
        assert_eq!(by_category[&AlertCategory::Rain], Severity::Info);
        assert_eq!(by_category[&AlertCategory::WaterLevel], Severity::Warning);
    }

    #[test]
    fn test_level_cooldown_spacing_holds_for_any_sequence() {
        let window = Duration::from_secs(60);
        let mut rng = StdRng::seed_from_u64(99);
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Level, window);
        let mut last: HashMap<AlertCategory, i64> = HashMap::new();
        let mut now = 0i64;

        for _ in 0..2_000 {
            now += rng.gen_range(0..20_000);
            let snapshot = random_snapshot(&mut rng);
            for event in evaluator.evaluate(None, &snapshot, now) {
                if let Some(prev) = last.insert(event.category, event.timestamp) {
                    assert!(event.timestamp - prev >= window.as_millis() as i64);
                }
            }
        }
        assert!(!last.is_empty());
    }

    #[test]
    fn test_edge_cooldown_safety_net_suppresses_flapping() {
        let mut evaluator = AlertEvaluator::new(AlertPolicy::Edge, Duration::from_secs(60));
        let low = reading(290.0, 30.0);
        let high = reading(310.0, 30.0);

        assert_eq!(evaluator.evaluate(Some(&low), &high, 0).len(), 1);
        assert!(evaluator.evaluate(Some(&high), &low, 5_000).is_empty());
        assert!(evaluator.evaluate(Some(&low), &high, 10_000).is_empty());
        assert_eq!(evaluator.evaluate(Some(&low), &high, 70_000).len(), 1);
    }

    #[test]
    fn test_deterministic_for_same_inputs() {
        let previous = reading(280.0, 25.0);
        let current = reading(320.0, 15.0);
        let mut a = AlertEvaluator::new(AlertPolicy::Edge, Duration::ZERO);
        let mut b = AlertEvaluator::new(AlertPolicy::Edge, Duration::ZERO);
        assert_eq!(
            a.evaluate(Some(&previous), &current, 42),
            b.evaluate(Some(&previous), &current, 42)
        );
    }
}
