use std::time::Duration;

use vppmux_adapter::AdapterError;
use vppmux_api::{CodecError, VppApiError};

/// Errors that can occur in connection and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The connection is not (or no longer) connected to VPP.
    #[error("not connected to VPP")]
    NotConnected,

    /// The channel has been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// A registered message is not known to the connected VPP. Not retriable.
    #[error("incompatible VPP: {0}")]
    Incompatible(String),

    /// The message cannot be resolved against the connected VPP.
    #[error("message {name} ({crc}) is not compatible with the connected VPP")]
    UnknownMessage { name: String, crc: String },

    /// No message with this ID is known.
    #[error("unknown message ID {0}")]
    UnknownMessageId(u16),

    /// No reply arrived before the reply timeout.
    #[error("no reply received within the timeout period {0:?}")]
    ReplyTimeout(Duration),

    /// A reply to a later request arrived first; the awaited reply is lost.
    #[error("missing binary API reply with sequence number {seq_num}")]
    MissingReply { seq_num: u16 },

    /// The terminating frame of a multipart reply arrived for a single request.
    #[error("multipart reply received while a single reply was expected")]
    UnexpectedMultipart,

    /// The reply is of a different type than the caller expected.
    #[error(
        "received invalid message ID (seq_num={seq_num}), expected {expected} ({expected_name}), \
         but got {got} ({got_name}); check that the channel is not shared between tasks"
    )]
    InvalidMessageId {
        seq_num: u16,
        expected: u16,
        expected_name: String,
        got: u16,
        got_name: String,
    },

    /// Encoding or decoding a message failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// VPP answered with a non-zero return value.
    #[error(transparent)]
    Api(#[from] VppApiError),

    /// The adapter failed.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// The subscription was already removed.
    #[error("subscription for {0:?} not found")]
    SubscriptionNotFound(String),

    /// The health check probe did not get a reply in time.
    #[error("health check probe timed out")]
    ProbeTimeout,

    /// Every channel ID is in use.
    #[error("no free channel ID")]
    ChannelsExhausted,

    /// Background tasks need a Tokio runtime.
    #[error("no Tokio runtime available")]
    NoRuntime,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MuxError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            MuxError::Incompatible(_)
                | MuxError::Config(_)
                | MuxError::Json(_)
                | MuxError::NoRuntime
        )
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
