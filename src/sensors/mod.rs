//! Sensor readings pushed by the microcontroller.
//!
//! Raw payloads are normalized into [`SensorSnapshot`] at a single boundary;
//! everything downstream works against the typed record.

pub mod history;
pub mod snapshot;

pub use history::{HistoryPoint, HistoryRange};
pub use snapshot::{SensorSnapshot, normalize, parse_last_update};
