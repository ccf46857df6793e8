//! Simulated sensor node for development.
//!
//! Writes a random-walk reading to the sensor path on a fixed period, in the
//! same shape the microcontroller uses. Gas and water level drift far enough
//! to cross the alert thresholds now and then.

use crate::sensors::snapshot::LAST_UPDATE_FORMAT;
use crate::source::DataSource;
use chrono::{DateTime, Local};
use log::{error, info};
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

#[derive(Debug, Clone, PartialEq)]
pub struct SensorWalk {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub gas: f64,
    pub rain: bool,
    pub water_level: f64,
    pub motion: bool,
    pub door_open: bool,
    pub battery_percent: f64,
}

impl Default for SensorWalk {
    fn default() -> Self {
        Self {
            temperature: 27.0,
            humidity: 55.0,
            pressure: 1012.0,
            gas: 220.0,
            rain: false,
            water_level: 45.0,
            motion: false,
            door_open: false,
            battery_percent: 80.0,
        }
    }
}

fn drift<R: Rng>(rng: &mut R, value: f64, step: f64, min: f64, max: f64) -> f64 {
    (value + rng.gen_range(-step..=step)).clamp(min, max)
}

impl SensorWalk {
    pub fn step<R: Rng>(&mut self, rng: &mut R) {
        self.temperature = drift(rng, self.temperature, 0.8, 15.0, 40.0);
        self.humidity = drift(rng, self.humidity, 3.0, 10.0, 95.0);
        self.pressure = drift(rng, self.pressure, 0.5, 990.0, 1030.0);
        self.gas = drift(rng, self.gas, 40.0, 100.0, 600.0);
        self.water_level = drift(rng, self.water_level, 4.0, 0.0, 100.0);
        self.battery_percent = drift(rng, self.battery_percent, 3.0, 0.0, 100.0);
        if rng.gen_bool(0.1) {
            self.rain = !self.rain;
        }
        self.motion = rng.gen_bool(0.2);
        if rng.gen_bool(0.05) {
            self.door_open = !self.door_open;
        }
    }

    /// Payload as the node writes it. The node sets `last_update` from its
    /// own clock and leaves `timestamp` out.
    pub fn payload(&self, now: DateTime<Local>) -> Value {
        let round1 = |v: f64| (v * 10.0).round() / 10.0;
        json!({
            "temperature": round1(self.temperature),
            "humidity": round1(self.humidity),
            "pressure": round1(self.pressure),
            "gas": self.gas.round(),
            "rain": self.rain,
            "WaterLevel": round1(self.water_level),
            "motion": self.motion,
            "door": if self.door_open { 1 } else { 0 },
            "power": 1,
            "batteryVoltage": round1(3.3 + self.battery_percent / 100.0 * 0.9),
            "batteryPercent": self.battery_percent.round(),
            "last_update": now.format(LAST_UPDATE_FORMAT).to_string(),
        })
    }
}

/// Spawn the simulated node. Abort the returned task to stop it.
pub fn run_sensor_simulation(
    source: Arc<dyn DataSource>,
    path: String,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut walk = SensorWalk::default();
        let mut interval = interval(period);
        loop {
            interval.tick().await;
            walk.step(&mut rand::thread_rng());
            let payload = walk.payload(Local::now());
            match source.set(&path, payload).await {
                Ok(()) => info!(
                    "[Sim] gas {:.0} PPM, water {:.1} cm, rain {}",
                    walk.gas, walk.water_level, walk.rain
                ),
                Err(e) => error!("[Sim] Failed to write reading: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::normalize;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_walk_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut walk = SensorWalk::default();
        for _ in 0..1_000 {
            walk.step(&mut rng);
            assert!((100.0..=600.0).contains(&walk.gas));
            assert!((0.0..=100.0).contains(&walk.water_level));
            assert!((0.0..=100.0).contains(&walk.battery_percent));
        }
    }

    #[test]
    fn test_payload_normalizes() {
        let payload = SensorWalk::default().payload(Local::now());
        let snapshot = normalize(&payload, 42).unwrap();
        assert_eq!(snapshot.gas, Some(220.0));
        assert_eq!(snapshot.water_level, Some(45.0));
        assert_eq!(snapshot.rain, Some(false));
        assert_eq!(snapshot.door, Some(0.0));
        assert_eq!(snapshot.timestamp, 42);
        assert!(snapshot.last_update_millis().is_some());
    }
}
