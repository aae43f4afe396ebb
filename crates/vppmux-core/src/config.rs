use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MuxError, Result};

/// Tunables of a connection and its channels.
///
/// Loadable from JSON with kebab-case keys; durations are written as
/// `"1s"` or `"250ms"`. Missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MuxConfig {
    /// Capacity of each channel's outbound request queue.
    pub request_queue_size: usize,
    /// Capacity of each channel's inbound reply queue.
    pub reply_queue_size: usize,
    /// Capacity of the connection event queue returned by `async_connect`.
    pub event_queue_size: usize,
    /// Default reply timeout of new channels.
    #[serde(with = "duration_str")]
    pub reply_timeout: Duration,
    /// Pause between health check probes.
    #[serde(with = "duration_str")]
    pub health_check_probe_interval: Duration,
    /// How long a single probe waits for its reply.
    #[serde(with = "duration_str")]
    pub health_check_reply_timeout: Duration,
    /// Probe timeouts tolerated before the connection is declared lost.
    pub health_check_threshold: u32,
    /// Pause between reconnect attempts.
    #[serde(with = "duration_str")]
    pub reconnect_backoff: Duration,
    /// How long the dispatcher waits for room in a full reply queue.
    #[serde(with = "duration_str")]
    pub reply_send_grace: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            request_queue_size: 100,
            reply_queue_size: 100,
            event_queue_size: 100,
            reply_timeout: Duration::from_secs(1),
            health_check_probe_interval: Duration::from_secs(1),
            health_check_reply_timeout: Duration::from_millis(100),
            health_check_threshold: 1,
            reconnect_backoff: Duration::from_secs(1),
            reply_send_grace: Duration::from_millis(100),
        }
    }
}

impl MuxConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json_str(&input)
    }

    /// Reject zero queue sizes and zero durations.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("request-queue-size", self.request_queue_size),
            ("reply-queue-size", self.reply_queue_size),
            ("event-queue-size", self.event_queue_size),
        ];
        for (key, value) in sizes {
            if value == 0 {
                return Err(MuxError::Config(format!("{key} must be greater than zero")));
            }
        }

        let durations = [
            ("reply-timeout", self.reply_timeout),
            ("health-check-probe-interval", self.health_check_probe_interval),
            ("health-check-reply-timeout", self.health_check_reply_timeout),
            ("reconnect-backoff", self.reconnect_backoff),
            ("reply-send-grace", self.reply_send_grace),
        ];
        for (key, value) in durations {
            if value.is_zero() {
                return Err(MuxError::Config(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// Parse a duration written as `"5s"`, `"150ms"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

/// Render a duration the way [`parse_duration`] reads it.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(de::Error::custom)
    }
}
