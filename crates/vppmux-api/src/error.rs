/// Errors that can occur while encoding or decoding binary API messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before a field could be read.
    #[error("message truncated (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// A fixed-size string field does not fit its slot.
    #[error("field {field} too long ({len} bytes, max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidString { field: &'static str },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
