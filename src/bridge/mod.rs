pub mod handle;
pub(crate) mod reader;

pub use handle::{BridgeBuilder, BridgeHandle};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("No open serial connection")]
    TransportUnavailable,

    #[error("Write failed: {0}")]
    Write(#[from] crate::serial::SerialError),
}
