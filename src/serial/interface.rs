use std::time::Duration;

use serialport::SerialPort;
use tokio::time::timeout;

use super::{Result, SerialError};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Owns the physical serial connection to the plant monitor.
///
/// Reads are chunked with a bounded timeout; line assembly belongs to the
/// read loop. Writes go through the same handle so that a single lock around
/// the interface serializes every writer on the half-duplex wire.
pub struct SerialInterface {
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
    baud_rate: u32,
}

impl SerialInterface {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            port: None,
            port_name: None,
            baud_rate,
        }
    }

    /// List the names of serial ports visible on this host.
    pub fn available_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    /// Open the given port. On failure the interface stays closed and the
    /// caller decides when to retry.
    pub fn connect(&mut self, port_name: &str) -> Result<()> {
        let port = serialport::new(port_name, self.baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    SerialError::PortNotFound(port_name.to_string())
                }
                _ => SerialError::ConnectionFailed(e.to_string()),
            })?;

        self.port = Some(port);
        self.port_name = Some(port_name.to_string());

        log::info!("Connected to plant monitor on {}", port_name);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(name) = &self.port_name {
            log::info!("Disconnecting from {}", name);
        }
        self.port = None;
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Write raw bytes to the device.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| SerialError::ConnectionFailed("Not connected".to_string()))?;

        let bytes_written = port.write(data).map_err(SerialError::IoError)?;
        port.flush().map_err(SerialError::IoError)?;

        Ok(bytes_written)
    }

    /// Read whatever bytes are pending, waiting at most `timeout_ms`.
    ///
    /// Returns `Ok(0)` when the deadline passes with no data, so the caller's
    /// loop always regains control within the timeout bound.
    pub async fn read_data(&mut self, buffer: &mut [u8], timeout_ms: u64) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| SerialError::ConnectionFailed("Not connected".to_string()))?;

        let read_operation = async {
            loop {
                match port.bytes_to_read() {
                    Ok(0) => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Ok(_) => match port.read(buffer) {
                        Ok(n) => return Ok(n),
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => return Err(SerialError::IoError(e)),
                    },
                    Err(e) => return Err(SerialError::SerialportError(e)),
                }
            }
        };

        match timeout(Duration::from_millis(timeout_ms), read_operation).await {
            Ok(result) => result,
            // Quiet wire, not a failure
            Err(_) => Ok(0),
        }
    }
}

#[cfg(test)]
impl SerialInterface {
    /// Wrap an already-open (scripted) port, bypassing the OS device layer.
    pub(crate) fn with_port(port: Box<dyn SerialPort>, port_name: &str) -> Self {
        Self {
            port: Some(port),
            port_name: Some(port_name.to_string()),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}
