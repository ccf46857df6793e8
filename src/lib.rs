//! IOTMesh hub library.
//!
//! Follows a home sensor node through the hosted realtime database: readings
//! are normalized, checked against alert rules and logged, actuator switches
//! are mirrored, and threshold crossings are forwarded as push notifications.

pub mod alerts;
pub mod clock;
pub mod config;
pub mod controls;
pub mod dashboard;
pub mod error;
pub mod instance_lock;
pub mod monitor;
pub mod notify;
pub mod sensors;
pub mod session;
pub mod simulation;
pub mod source;
pub mod status;
pub mod telegram;
pub mod users;
