pub mod interface;
#[cfg(test)]
pub(crate) mod mock;

pub use interface::SerialInterface;

use serde::{Deserialize, Serialize};

/// Connection state published by the read loop over a watch channel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionState {
    pub open: bool,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn opened() -> Self {
        Self {
            open: true,
            last_error: None,
        }
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        Self {
            open: false,
            last_error: Some(reason.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
