//! Diagnostics for the `vppmux` binary.
//!
//! Everything goes to stderr; stdout carries command output only. The
//! `--log-level` flag sets the default directive and `VPPMUX_LOG` may add
//! per-target directives on top, in `EnvFilter` syntax.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable holding extra filter directives.
pub const LOG_ENV: &str = "VPPMUX_LOG";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter for `level`, extended by any valid directives in `extra`.
/// Invalid directives are skipped.
pub fn build_filter(level: LogLevel, extra: Option<&str>) -> EnvFilter {
    let mut filter = EnvFilter::new(level.directive());
    for directive in extra.unwrap_or_default().split(',').map(str::trim) {
        if directive.is_empty() {
            continue;
        }
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let extra = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, extra.as_deref()))
        .with_ansi(false)
        .with_target(true);

    // A subscriber may already be installed (tests); keep it.
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_sets_the_default_directive() {
        let filter = build_filter(LogLevel::Warn, None);
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn extra_directives_are_added_and_junk_skipped() {
        let filter = build_filter(LogLevel::Error, Some("vppmux_core=trace, ,not a directive=="));
        let rendered = filter.to_string();
        assert!(rendered.contains("vppmux_core=trace"), "{rendered}");
        assert!(rendered.contains("error"), "{rendered}");
    }
}
