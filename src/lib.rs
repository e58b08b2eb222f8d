//! Serial protocol bridge for plant-monitor microcontrollers.
//!
//! One bridge instance owns one serial endpoint. Incoming lines are decoded
//! into typed [`protocol::BridgeEvent`]s and fanned out over a broadcast
//! channel; typed [`protocol::Command`]s go the other way under a shared write
//! lock. A periodic scheduler keeps the device clock in sync. The web or UI
//! layer on top of this is somebody else's problem: it subscribes, queries
//! snapshots, and submits commands through [`bridge::BridgeHandle`].

pub mod bridge;
pub mod config;
pub mod protocol;
pub mod serial;
pub mod timesync;

pub use bridge::{BridgeBuilder, BridgeHandle, SubmitError};
pub use config::BridgeConfig;
pub use protocol::{BridgeEvent, Command, LogEntry, SensorReading, ThresholdKind, ThresholdState};
pub use serial::{ConnectionState, SerialError};
pub use timesync::{SystemTimeSource, TimeSource, TimeSyncError};
