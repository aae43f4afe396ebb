use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use vppmux_adapter::VppAdapter;
use vppmux_core::MuxConfig;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod ping;
pub mod version;
pub mod watch;

const DEFAULT_SOCKET: &str = "/run/vpp/api.sock";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send control pings to VPP and print the replies.
    Ping(PingArgs),
    /// Keep a health-checked connection open and print state changes.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat, config: MuxConfig) -> CliResult<i32> {
    match command {
        Command::Ping(args) => ping::run(args, format, config).await,
        Command::Watch(args) => watch::run(args, format, config).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// VPP binary-API socket.
    #[arg(default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,
    /// Number of pings to send.
    #[arg(long, short = 'c', default_value = "1")]
    pub count: u32,
    /// Pause between pings (e.g. 1s, 200ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Bound on connecting and on each reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// VPP binary-API socket.
    #[arg(default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a CLI duration; zero is rejected.
pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let value =
        vppmux_core::config::parse_duration(input).map_err(|err| CliError::new(USAGE, err))?;
    if value.is_zero() {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(value)
}

#[cfg(unix)]
pub fn socket_adapter(
    path: &std::path::Path,
    timeout: Duration,
) -> CliResult<Arc<dyn VppAdapter>> {
    let mut config = vppmux_adapter::SocketConfig::new(path);
    config.client_name = format!("vppmux-cli-{}", std::process::id());
    config.connect_timeout = timeout;
    config.max_wait_ready = timeout;
    Ok(Arc::new(vppmux_adapter::SocketAdapter::new(config)))
}

#[cfg(not(unix))]
pub fn socket_adapter(
    _path: &std::path::Path,
    _timeout: Duration,
) -> CliResult<Arc<dyn VppAdapter>> {
    Err(CliError::new(
        USAGE,
        "the VPP binary-API socket is only available on Unix platforms",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timeout_accepts_seconds_and_millis() {
        assert_eq!(parse_timeout("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_timeout("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_timeout_rejects_zero_and_garbage() {
        assert_eq!(parse_timeout("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_timeout("bad").unwrap_err().code, USAGE);
    }
}
