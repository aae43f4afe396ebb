use std::path::PathBuf;
use std::time::Duration;

use vppmux_api::CodecError;

/// Errors that can occur in adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Failed to connect to the specified socket.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the link.
    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The adapter is not connected.
    #[error("adapter not connected")]
    NotConnected,

    /// The peer closed the link.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// VPP does not know a message with this name and crc.
    #[error("unknown message: {name} ({crc})")]
    UnknownMessage { name: String, crc: String },

    /// The client registration exchange failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An operation did not complete in time.
    #[error("timed out waiting for {operation} after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A socket frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Failure injected through the mock adapter.
    #[error("mock adapter: {0}")]
    Mock(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
