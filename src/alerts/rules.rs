//! Canonical alert threshold tables.
//!
//! Both the in-process evaluator and the push notifier read these tables, so
//! the two call sites cannot drift apart.
//!
//! | Policy | Category    | Condition            | Severity |
//! |--------|-------------|----------------------|----------|
//! | level  | Temperature | temperature > 30     | warning  |
//! | level  | Humidity    | humidity < 30        | warning  |
//! | level  | Air Quality | gas > 450            | error    |
//! | level  | Rain        | rain                 | info     |
//! | level  | Water Level | water level < 20     | warning  |
//! | edge   | Gas         | gas > 300            | warning  |
//! | edge   | Water Level | water level < 20     | warning  |
//! | edge   | Rain        | rain                 | info     |
//! | edge   | Battery     | battery percent < 20 | warning  |

use super::{AlertCategory, AlertEvent, AlertPolicy, Severity};
use crate::sensors::SensorSnapshot;

/// A numeric sensor field a rule can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Humidity,
    Gas,
    WaterLevel,
    BatteryPercent,
}

impl Metric {
    pub fn read(self, snapshot: &SensorSnapshot) -> Option<f64> {
        match self {
            Metric::Temperature => snapshot.temperature,
            Metric::Humidity => snapshot.humidity,
            Metric::Gas => snapshot.gas,
            Metric::WaterLevel => snapshot.water_level,
            Metric::BatteryPercent => snapshot.battery_percent,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity | Metric::BatteryPercent => "%",
            Metric::Gas => "PPM",
            Metric::WaterLevel => "cm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    Above(Metric, f64),
    Below(Metric, f64),
    Raining,
}

impl Condition {
    /// Whether the condition holds; `None` when the field is absent.
    pub fn holds(&self, snapshot: &SensorSnapshot) -> Option<bool> {
        match *self {
            Condition::Above(metric, threshold) => metric.read(snapshot).map(|v| v > threshold),
            Condition::Below(metric, threshold) => metric.read(snapshot).map(|v| v < threshold),
            Condition::Raining => snapshot.rain,
        }
    }

    /// The sensor value the condition looks at, if numeric.
    pub fn value(&self, snapshot: &SensorSnapshot) -> Option<f64> {
        match *self {
            Condition::Above(metric, _) | Condition::Below(metric, _) => metric.read(snapshot),
            Condition::Raining => None,
        }
    }

    fn unit(&self) -> Option<&'static str> {
        match *self {
            Condition::Above(metric, _) | Condition::Below(metric, _) => Some(metric.unit()),
            Condition::Raining => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub category: AlertCategory,
    pub severity: Severity,
    pub condition: Condition,
    pub label: &'static str,
}

impl Rule {
    /// Level semantics: the condition holds on this snapshot.
    pub fn fires_level(&self, current: &SensorSnapshot) -> bool {
        self.condition.holds(current) == Some(true)
    }

    /// Edge semantics: false on the previous snapshot, true on this one.
    /// An absent field on either side is not a transition.
    pub fn fires_edge(&self, previous: &SensorSnapshot, current: &SensorSnapshot) -> bool {
        self.condition.holds(previous) == Some(false) && self.condition.holds(current) == Some(true)
    }

    /// Human-readable message, e.g. `High gas level: 320 PPM`.
    pub fn message(&self, snapshot: &SensorSnapshot) -> String {
        match (self.condition.value(snapshot), self.condition.unit()) {
            (Some(value), Some(unit)) => {
                format!("{}: {} {}", self.label, format_value(value), unit)
            }
            _ => self.label.to_string(),
        }
    }

    pub fn event(&self, snapshot: &SensorSnapshot, fired_at: i64) -> AlertEvent {
        AlertEvent {
            category: self.category,
            severity: self.severity,
            message: self.message(snapshot),
            sensor_value: self.condition.value(snapshot),
            timestamp: fired_at,
        }
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

pub const LEVEL_RULES: &[Rule] = &[
    Rule {
        category: AlertCategory::Temperature,
        severity: Severity::Warning,
        condition: Condition::Above(Metric::Temperature, 30.0),
        label: "High temperature",
    },
    Rule {
        category: AlertCategory::Humidity,
        severity: Severity::Warning,
        condition: Condition::Below(Metric::Humidity, 30.0),
        label: "Low humidity",
    },
    Rule {
        category: AlertCategory::AirQuality,
        severity: Severity::Error,
        condition: Condition::Above(Metric::Gas, 450.0),
        label: "Critical gas level",
    },
    Rule {
        category: AlertCategory::Rain,
        severity: Severity::Info,
        condition: Condition::Raining,
        label: "Rain detected",
    },
    Rule {
        category: AlertCategory::WaterLevel,
        severity: Severity::Warning,
        condition: Condition::Below(Metric::WaterLevel, 20.0),
        label: "Low water level",
    },
];

pub const EDGE_RULES: &[Rule] = &[
    Rule {
        category: AlertCategory::Gas,
        severity: Severity::Warning,
        condition: Condition::Above(Metric::Gas, 300.0),
        label: "High gas level",
    },
    Rule {
        category: AlertCategory::WaterLevel,
        severity: Severity::Warning,
        condition: Condition::Below(Metric::WaterLevel, 20.0),
        label: "Water tank low",
    },
    Rule {
        category: AlertCategory::Rain,
        severity: Severity::Info,
        condition: Condition::Raining,
        label: "Rain detected",
    },
    Rule {
        category: AlertCategory::Battery,
        severity: Severity::Warning,
        condition: Condition::Below(Metric::BatteryPercent, 20.0),
        label: "Battery critically low",
    },
];

pub fn rules_for(policy: AlertPolicy) -> &'static [Rule] {
    match policy {
        AlertPolicy::Edge => EDGE_RULES,
        AlertPolicy::Level => LEVEL_RULES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(gas: Option<f64>, water: Option<f64>, rain: Option<bool>) -> SensorSnapshot {
        SensorSnapshot {
            gas,
            water_level: water,
            rain,
            ..Default::default()
        }
    }

    #[test]
    fn test_thresholds_are_strict() {
        let gas = EDGE_RULES[0];
        assert_eq!(gas.condition.holds(&snapshot(Some(300.0), None, None)), Some(false));
        assert_eq!(gas.condition.holds(&snapshot(Some(300.5), None, None)), Some(true));

        let water = EDGE_RULES[1];
        assert_eq!(water.condition.holds(&snapshot(None, Some(20.0), None)), Some(false));
        assert_eq!(water.condition.holds(&snapshot(None, Some(19.9), None)), Some(true));
    }

    #[test]
    fn test_absent_field_is_unknown_not_false() {
        let gas = EDGE_RULES[0];
        assert_eq!(gas.condition.holds(&SensorSnapshot::default()), None);
        assert!(!gas.fires_edge(&SensorSnapshot::default(), &snapshot(Some(500.0), None, None)));
    }

    #[test]
    fn test_edge_requires_transition() {
        let rain = EDGE_RULES[2];
        let dry = snapshot(None, None, Some(false));
        let wet = snapshot(None, None, Some(true));
        assert!(rain.fires_edge(&dry, &wet));
        assert!(!rain.fires_edge(&wet, &wet));
        assert!(!rain.fires_edge(&wet, &dry));
    }

    #[test]
    fn test_messages() {
        let current = snapshot(Some(320.0), Some(15.5), Some(true));
        assert_eq!(EDGE_RULES[0].message(&current), "High gas level: 320 PPM");
        assert_eq!(EDGE_RULES[1].message(&current), "Water tank low: 15.5 cm");
        assert_eq!(EDGE_RULES[2].message(&current), "Rain detected");

        let event = EDGE_RULES[2].event(&current, 99);
        assert_eq!(event.sensor_value, None);
        assert_eq!(event.timestamp, 99);
    }

    #[test]
    fn test_policy_tables() {
        assert_eq!(rules_for(AlertPolicy::Edge).len(), 4);
        assert_eq!(rules_for(AlertPolicy::Level).len(), 5);
        let critical_gas = rules_for(AlertPolicy::Level)
            .iter()
            .find(|r| r.category == AlertCategory::AirQuality)
            .unwrap();
        assert_eq!(critical_gas.severity, Severity::Error);
    }
}
