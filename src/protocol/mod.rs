pub mod decoder;

pub use decoder::{DecodeState, LineDecoder};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Wire tokens for protocol version 1. The device speaks newline-delimited
// ASCII; every literal the decoder or encoder matches against lives here.
pub const SENSOR_MOISTURE_TAG: char = 'm';
pub const SENSOR_LIGHT_TAG: char = 'l';
pub const THRESHOLD_MOISTURE_TAG: char = 'M';
pub const THRESHOLD_LIGHT_TAG: char = 'L';
pub const LOG_HEADER_TOKEN: &str = "LOGS_BEGIN";
pub const LOG_END_TOKEN: &str = "LOGS_END";
pub const ACK_TOKEN: &str = "OK";
pub const UNKNOWN_COMMAND_TAG: &str = "UNK";
pub const DEVICE_ERROR_TAG: &str = "ERR";

/// Device-side comparison values, both bounded to [0, 1023].
pub const THRESHOLD_MIN: u16 = 0;
pub const THRESHOLD_MAX: u16 = 1023;

pub fn clamp_threshold(value: u16) -> u16 {
    value.clamp(THRESHOLD_MIN, THRESHOLD_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Moisture,
    Light,
}

/// Snapshot of the device thresholds as last confirmed by the device.
///
/// Owned by the read loop; everyone else sees it through a watch channel.
/// Updates are acknowledgement-gated: a client submitting `M500` does not
/// touch this until the device reports the new value back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdState {
    pub moisture: u16,
    pub light: u16,
}

impl ThresholdState {
    pub fn set(&mut self, kind: ThresholdKind, value: u16) {
        let value = clamp_threshold(value);
        match kind {
            ThresholdKind::Moisture => self.moisture = value,
            ThresholdKind::Light => self.light = value,
        }
    }

    pub fn get(&self, kind: ThresholdKind) -> u16 {
        match kind {
            ThresholdKind::Moisture => self.moisture,
            ThresholdKind::Light => self.light,
        }
    }
}

impl Default for ThresholdState {
    fn default() -> Self {
        // Defaults match the device firmware defaults
        Self {
            moisture: 500,
            light: 300,
        }
    }
}

/// One decoded sensor report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    pub moisture: u32,
    pub light: u32,
    pub observed_at: DateTime<Utc>,
}

/// One record from the device's historical event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    pub event_type: u32,
    pub value: u32,
}

/// Typed command toward the device. Constructed, encoded, written, discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetClock(i64),
    SetMoistureThreshold(u16),
    SetLightThreshold(u16),
    RequestThreshold(ThresholdKind),
    RequestLogs,
    ClearLogs,
}

impl Command {
    /// Encode to a single newline-terminated wire line. Threshold payloads
    /// are clamped so an out-of-range value never reaches the device.
    pub fn encode(&self) -> String {
        match self {
            Command::SetClock(unix_seconds) => format!("T{}\n", unix_seconds),
            Command::SetMoistureThreshold(value) => {
                format!("{}{}\n", THRESHOLD_MOISTURE_TAG, clamp_threshold(*value))
            }
            Command::SetLightThreshold(value) => {
                format!("{}{}\n", THRESHOLD_LIGHT_TAG, clamp_threshold(*value))
            }
            Command::RequestThreshold(ThresholdKind::Moisture) => "X\n".to_string(),
            Command::RequestThreshold(ThresholdKind::Light) => "Z\n".to_string(),
            Command::RequestLogs => "G\n".to_string(),
            Command::ClearLogs => "D\n".to_string(),
        }
    }
}

/// Everything the decoder can hand to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    SensorUpdated(SensorReading),
    ThresholdUpdated { kind: ThresholdKind, value: u16 },
    LogDataReady { entries: Vec<LogEntry> },
    DeviceError { detail: String },
    DeviceRejectedCommand { detail: String },
    CommandAcknowledged,
    TransportError { message: String },
    UnclassifiedLine { raw: String },
    DecodeError { line: String, reason: String },
    DecodeWarning { line: String },
}
