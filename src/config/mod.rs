use std::time::Duration;

use serde::Deserialize;

use crate::serial::interface::DEFAULT_BAUD_RATE;

/// Runtime settings for one bridge instance.
///
/// Deserializable so hosts can load it from a settings file; `Default` gives
/// values matching the stock plant-monitor firmware.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial port spec, e.g. "COM4" or "/dev/ttyACM0".
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on a single blocking read. Keeps the read loop responsive
    /// to shutdown and capture-timeout checks.
    pub read_timeout_ms: u64,
    /// Fixed interval between reconnect attempts once the port drops.
    pub reconnect_interval_secs: u64,
    /// Inactivity window after which an in-flight log capture is flushed.
    pub capture_timeout_secs: u64,
    /// Period of the device clock sync.
    pub sync_period_secs: u64,
    /// Zone shift applied to the synced clock, in hours.
    pub tz_offset_hours: i32,
    /// Capacity of the subscriber broadcast channel.
    pub event_capacity: usize,
}

impl BridgeConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            reconnect_interval_secs: 5,
            capture_timeout_secs: 3,
            sync_period_secs: 60,
            tz_offset_hours: 0,
            event_capacity: 256,
        }
    }
}
