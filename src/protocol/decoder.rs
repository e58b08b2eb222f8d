use std::time::{Duration, Instant};

use chrono::Utc;

use super::{
    clamp_threshold, BridgeEvent, LogEntry, SensorReading, ThresholdKind, ACK_TOKEN,
    DEVICE_ERROR_TAG, LOG_END_TOKEN, LOG_HEADER_TOKEN, SENSOR_LIGHT_TAG, SENSOR_MOISTURE_TAG,
    THRESHOLD_LIGHT_TAG, THRESHOLD_MOISTURE_TAG, UNKNOWN_COMMAND_TAG,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Normal,
    CapturingLogs,
}

/// In-flight log dump. At most one session exists at a time; the buffer is
/// flushed exactly once on the end token, inactivity timeout, or transport
/// loss.
struct CaptureSession {
    buffer: Vec<LogEntry>,
    started_at: Instant,
    last_record_at: Instant,
}

impl CaptureSession {
    fn new(now: Instant) -> Self {
        Self {
            buffer: Vec::new(),
            started_at: now,
            last_record_at: now,
        }
    }
}

/// Protocol state machine for the device-to-bridge direction.
///
/// Consumes one trimmed line at a time and classifies it into `BridgeEvent`s.
/// Token matchers are fixed at construction; nothing is compiled per line.
/// Unexpected lines during a capture are tolerated (reported as
/// `DecodeWarning`, already-buffered records are kept) rather than aborting
/// the session.
pub struct LineDecoder {
    capture_timeout: Duration,
    capture: Option<CaptureSession>,
}

impl LineDecoder {
    pub fn new(capture_timeout: Duration) -> Self {
        Self {
            capture_timeout,
            capture: None,
        }
    }

    pub fn state(&self) -> DecodeState {
        if self.capture.is_some() {
            DecodeState::CapturingLogs
        } else {
            DecodeState::Normal
        }
    }

    /// Classify one line. Empty input is a no-op tick.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Vec<BridgeEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        match self.state() {
            DecodeState::Normal => self.handle_normal(line, now),
            DecodeState::CapturingLogs => self.handle_capturing(line, now),
        }
    }

    /// Flush a capture whose inactivity timeout has passed. The read loop
    /// calls this on every quiet read tick.
    pub fn poll(&mut self, now: Instant) -> Vec<BridgeEvent> {
        let timed_out = self
            .capture
            .as_ref()
            .map(|s| now.duration_since(s.last_record_at) >= self.capture_timeout)
            .unwrap_or(false);

        if timed_out {
            log::warn!("Log capture timed out waiting for records, flushing");
            vec![self.flush_capture()]
        } else {
            Vec::new()
        }
    }

    /// Transport went away. Flushes any in-flight capture, then reports the
    /// failure; a later reconnect starts from a clean `Normal` state.
    pub fn notify_transport_lost(&mut self, message: impl Into<String>) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        if self.capture.is_some() {
            events.push(self.flush_capture());
        }
        events.push(BridgeEvent::TransportError {
            message: message.into(),
        });
        events
    }

    fn handle_normal(&mut self, line: &str, now: Instant) -> Vec<BridgeEvent> {
        if line == LOG_HEADER_TOKEN {
            log::debug!("Log stream started");
            self.capture = Some(CaptureSession::new(now));
            return Vec::new();
        }
        if line == LOG_END_TOKEN {
            // Terminator with no open capture; diagnostic, not an error
            return vec![BridgeEvent::UnclassifiedLine {
                raw: line.to_string(),
            }];
        }
        if line == ACK_TOKEN {
            return vec![BridgeEvent::CommandAcknowledged];
        }
        if let Some(detail) = line.strip_prefix(UNKNOWN_COMMAND_TAG) {
            return vec![BridgeEvent::DeviceRejectedCommand {
                detail: detail.trim().to_string(),
            }];
        }
        if let Some(detail) = line.strip_prefix(DEVICE_ERROR_TAG) {
            return vec![BridgeEvent::DeviceError {
                detail: detail.trim().to_string(),
            }];
        }
        if let Some(rest) = line.strip_prefix(SENSOR_MOISTURE_TAG) {
            return vec![decode_sensor_report(line, rest)];
        }
        if let Some(rest) = line.strip_prefix(SENSOR_LIGHT_TAG) {
            // Fields in the wrong order ("l700m300") are a malformed sensor
            // report; other lowercase-l lines stay diagnostics
            if rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                return vec![BridgeEvent::DecodeError {
                    line: line.to_string(),
                    reason: "malformed sensor report".to_string(),
                }];
            }
        }
        if let Some(rest) = line.strip_prefix(THRESHOLD_MOISTURE_TAG) {
            return vec![decode_threshold_report(line, rest, ThresholdKind::Moisture)];
        }
        if let Some(rest) = line.strip_prefix(THRESHOLD_LIGHT_TAG) {
            return vec![decode_threshold_report(line, rest, ThresholdKind::Light)];
        }

        vec![BridgeEvent::UnclassifiedLine {
            raw: line.to_string(),
        }]
    }

    fn handle_capturing(&mut self, line: &str, now: Instant) -> Vec<BridgeEvent> {
        if line == LOG_END_TOKEN {
            return vec![self.flush_capture()];
        }

        if let Some(entry) = parse_log_record(line) {
            // Invariant: capture is Some while in CapturingLogs
            if let Some(session) = self.capture.as_mut() {
                session.buffer.push(entry);
                session.last_record_at = now;
            }
            return Vec::new();
        }

        // Desync: keep what we have buffered and keep listening for records
        log::warn!("Unexpected line during log capture: {}", line);
        vec![BridgeEvent::DecodeWarning {
            line: line.to_string(),
        }]
    }

    fn flush_capture(&mut self) -> BridgeEvent {
        let session = self.capture.take();
        let entries = session.map(|s| {
            log::debug!(
                "Log stream finished with {} entries after {:?}",
                s.buffer.len(),
                s.started_at.elapsed()
            );
            s.buffer
        });
        BridgeEvent::LogDataReady {
            entries: entries.unwrap_or_default(),
        }
    }
}

/// Parse a sensor report `m<moisture>l<light>`. `rest` is the line with the
/// moisture tag already stripped.
fn decode_sensor_report(line: &str, rest: &str) -> BridgeEvent {
    let decoded = rest
        .split_once(SENSOR_LIGHT_TAG)
        .and_then(|(moisture, light)| {
            let moisture = moisture.parse::<u32>().ok()?;
            let light = light.parse::<u32>().ok()?;
            Some((moisture, light))
        });

    match decoded {
        Some((moisture, light)) => BridgeEvent::SensorUpdated(SensorReading {
            moisture,
            light,
            observed_at: Utc::now(),
        }),
        None => BridgeEvent::DecodeError {
            line: line.to_string(),
            reason: "malformed sensor report".to_string(),
        },
    }
}

/// Parse a threshold report `M<digits>` or `L<digits>`. `rest` is the line
/// with the tag already stripped.
fn decode_threshold_report(line: &str, rest: &str, kind: ThresholdKind) -> BridgeEvent {
    match rest.parse::<u16>() {
        Ok(value) => BridgeEvent::ThresholdUpdated {
            kind,
            value: clamp_threshold(value),
        },
        Err(_) => BridgeEvent::DecodeError {
            line: line.to_string(),
            reason: "malformed threshold report".to_string(),
        },
    }
}

/// Parse one log record `<ts>,<type>,<value>` (all non-negative integers).
fn parse_log_record(line: &str) -> Option<LogEntry> {
    let mut fields = line.split(',');
    let timestamp = fields.next()?.trim().parse::<u64>().ok()?;
    let event_type = fields.next()?.trim().parse::<u32>().ok()?;
    let value = fields.next()?.trim().parse::<u32>().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(LogEntry {
        timestamp,
        event_type,
        value,
    })
}
