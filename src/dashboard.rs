//! Presentation view of the latest snapshot.
//!
//! This is the only place absent readings become `0`: the snapshot keeps them
//! absent, and the view substitutes display defaults and classifies each
//! reading for its status indicator.

use crate::sensors::SensorSnapshot;
use crate::sensors::snapshot::LAST_UPDATE_FORMAT;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use strum::Display;

/// A sensor counts as online while its `last_update` is at most this old (ms).
pub const ONLINE_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Cold,
    Ok,
    Warning,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BatteryStatus {
    Ok,
    Warning,
    Critical,
}

pub fn temperature_status(celsius: f64) -> Status {
    if celsius < 25.0 {
        Status::Cold
    } else if celsius < 30.0 {
        Status::Ok
    } else if celsius < 35.0 {
        Status::Warning
    } else {
        Status::Alert
    }
}

pub fn humidity_status(percent: f64) -> Status {
    if !(30.0..=70.0).contains(&percent) {
        Status::Warning
    } else {
        Status::Ok
    }
}

pub fn gas_status(ppm: f64) -> Status {
    if ppm > 350.0 {
        Status::Alert
    } else if ppm > 250.0 {
        Status::Warning
    } else {
        Status::Ok
    }
}

pub fn water_status(cm: f64) -> Status {
    if cm > 60.0 {
        Status::Ok
    } else if cm > 20.0 {
        Status::Warning
    } else {
        Status::Alert
    }
}

pub fn battery_status(percent: f64) -> BatteryStatus {
    if percent > 60.0 {
        BatteryStatus::Ok
    } else if percent > 30.0 {
        BatteryStatus::Warning
    } else {
        BatteryStatus::Critical
    }
}

fn parse_device_time(last_update: Option<&str>) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(last_update?.trim(), LAST_UPDATE_FORMAT).ok()
}

/// `Last sync Today at 8:45 PM`, `Last sync Yesterday at ...`, or the full
/// date for anything older. `now` is local wall-clock time.
pub fn last_sync_label(last_update: Option<&str>, now: NaiveDateTime) -> String {
    let Some(updated) = parse_device_time(last_update) else {
        return "Last sync --".to_string();
    };

    let time = updated.format("%-I:%M %p");
    let today = now.date();
    if updated.date() == today {
        format!("Last sync Today at {}", time)
    } else if today.pred_opt() == Some(updated.date()) {
        format!("Last sync Yesterday at {}", time)
    } else {
        format!("Last sync {} at {}", updated.format("%-m/%-d/%Y"), time)
    }
}

/// Whether the device reported within [`ONLINE_WINDOW_MS`] of `now`.
pub fn sensor_online(last_update: Option<&str>, now: NaiveDateTime) -> bool {
    parse_device_time(last_update)
        .is_some_and(|updated| (now - updated).num_milliseconds() <= ONLINE_WINDOW_MS)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    /// A snapshot has been received at all
    pub connected: bool,
    pub sensor_online: bool,
    pub last_sync: String,
    pub temperature: f64,
    pub temperature_status: Status,
    pub humidity: f64,
    pub humidity_status: Status,
    pub gas: f64,
    pub gas_status: Status,
    pub pressure: f64,
    pub water_level: f64,
    pub water_status: Status,
    pub rain: bool,
    pub motion: bool,
    pub door_open: bool,
    /// `Some(true)` on mains, `Some(false)` on battery
    pub mains_power: Option<bool>,
    pub battery_percent: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub battery_status: BatteryStatus,
}

impl DashboardView {
    pub fn new(snapshot: Option<&SensorSnapshot>, now: NaiveDateTime) -> Self {
        let default = SensorSnapshot::default();
        let s = snapshot.unwrap_or(&default);

        let temperature = s.temperature.unwrap_or(0.0);
        let humidity = s.humidity.unwrap_or(0.0);
        let gas = s.gas.unwrap_or(0.0);
        let water_level = s.water_level.unwrap_or(0.0);
        let last_update = s.last_update.as_deref();

        Self {
            connected: snapshot.is_some(),
            sensor_online: sensor_online(last_update, now),
            last_sync: last_sync_label(last_update, now),
            temperature,
            temperature_status: temperature_status(temperature),
            humidity,
            humidity_status: humidity_status(humidity),
            gas,
            gas_status: gas_status(gas),
            pressure: s.pressure.unwrap_or(0.0),
            water_level,
            water_status: water_status(water_level),
            rain: s.rain.unwrap_or(false),
            motion: s.motion.unwrap_or(false),
            door_open: s.door == Some(1.0),
            mains_power: s.power.and_then(|p| match p as i64 {
                1 => Some(true),
                0 => Some(false),
                _ => None,
            }),
            battery_percent: s.battery_percent,
            battery_voltage: s.battery_voltage,
            battery_status: battery_status(s.battery_percent.unwrap_or(0.0)),
        }
    }

    pub fn rain_label(&self) -> &'static str {
        if self.rain { "Detected" } else { "Clear" }
    }

    pub fn rain_status(&self) -> Status {
        if self.rain { Status::Alert } else { Status::Ok }
    }

    pub fn motion_status(&self) -> Status {
        if self.motion { Status::Warning } else { Status::Ok }
    }

    pub fn door_label(&self) -> &'static str {
        if self.door_open { "Open" } else { "Closed" }
    }

    pub fn power_label(&self) -> &'static str {
        match self.mains_power {
            Some(true) => "Mains",
            Some(false) => "Battery",
            None => "Unknown",
        }
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}°C ({}) | {:.1}% ({}) | {:.1} PPM ({}) | {:.1} hPa | water {:.1} cm ({}) | rain {} | motion {} | door {} | power {}",
            self.temperature,
            self.temperature_status,
            self.humidity,
            self.humidity_status,
            self.gas,
            self.gas_status,
            self.pressure,
            self.water_level,
            self.water_status,
            self.rain_label(),
            if self.motion { "Detected" } else { "Clear" },
            self.door_label(),
            self.power_label(),
        )?;
        match (self.battery_percent, self.battery_voltage) {
            (None, None) => {}
            (percent, voltage) => write!(
                f,
                " | battery {}% {}V ({})",
                percent.map_or("--".to_string(), |p| format!("{:.0}", p)),
                voltage.map_or("--".to_string(), |v| format!("{:.2}", v)),
                self.battery_status
            )?,
        }
        write!(
            f,
            " | {} | sensor {}",
            self.last_sync,
            if self.sensor_online { "online" } else { "offline" }
        )
    }
}
