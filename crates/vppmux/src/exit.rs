use std::fmt;
use std::io;

use vppmux_adapter::AdapterError;
use vppmux_core::MuxError;

// Exit codes follow the rsfulmen DDR-0002 layout.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn adapter_error(context: &str, err: AdapterError) -> CliError {
    match err {
        AdapterError::Connect { source, .. } | AdapterError::Io(source) => {
            io_error(context, source)
        }
        AdapterError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        AdapterError::NotConnected | AdapterError::ConnectionClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        AdapterError::Handshake(_) | AdapterError::UnknownMessage { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        AdapterError::FrameTooLarge { .. } | AdapterError::Codec(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Adapter(err) => adapter_error(context, err),
        MuxError::Io(err) => io_error(context, err),
        MuxError::ReplyTimeout(_) | MuxError::ProbeTimeout => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        MuxError::NotConnected | MuxError::ChannelClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        MuxError::Config(_) | MuxError::Json(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        MuxError::Codec(_) | MuxError::InvalidMessageId { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        MuxError::Incompatible(_) | MuxError::Api(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = mux_error("ping", MuxError::ReplyTimeout(Duration::from_secs(1)));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("ping: "));

        let err = mux_error(
            "connect",
            MuxError::Adapter(AdapterError::Timeout {
                operation: "VPP API socket",
                after: Duration::from_secs(1),
            }),
        );
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn missing_socket_is_a_transport_error() {
        let err = mux_error(
            "connect",
            MuxError::Adapter(AdapterError::Connect {
                path: "/run/vpp/api.sock".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn config_errors_are_usage_errors() {
        let err = mux_error("config", MuxError::Config("bad".to_string()));
        assert_eq!(err.code, USAGE);
    }
}
