mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use vppmux_core::MuxConfig;

use crate::cmd::Command;
use crate::exit::{mux_error, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "vppmux", version, about = "VPP binary API multiplexer CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// JSON file with connection settings.
    #[arg(long, value_name = "FILE", env = "VPPMUX_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn load_config(path: Option<&PathBuf>) -> CliResult<MuxConfig> {
    match path {
        Some(path) => MuxConfig::from_json_file(path)
            .map_err(|err| mux_error(&format!("config {}", path.display()), err)),
        None => Ok(MuxConfig::default()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = match load_config(cli.config.as_ref()) {
        Ok(config) => cmd::run(cli.command, format, config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping_subcommand() {
        let cli = Cli::try_parse_from([
            "vppmux",
            "ping",
            "/tmp/api.sock",
            "--count",
            "3",
            "--timeout",
            "500ms",
        ])
        .expect("ping args should parse");

        match cli.command {
            Command::Ping(args) => {
                assert_eq!(args.count, 3);
                assert_eq!(args.timeout, "500ms");
                assert_eq!(args.socket, PathBuf::from("/tmp/api.sock"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ping_defaults_to_vpp_socket() {
        let cli = Cli::try_parse_from(["vppmux", "ping"]).expect("ping args should parse");
        match cli.command {
            Command::Ping(args) => assert_eq!(args.socket, PathBuf::from("/run/vpp/api.sock")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "vppmux",
            "watch",
            "--format",
            "json",
            "--log-level",
            "debug",
            "--config",
            "/etc/vppmux.json",
        ])
        .expect("watch args should parse");

        assert!(matches!(cli.command, Command::Watch(_)));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/vppmux.json")));
    }

    #[test]
    fn rejects_unknown_format() {
        let err = Cli::try_parse_from(["vppmux", "--format", "raw", "version"])
            .expect_err("raw is not a supported format");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
