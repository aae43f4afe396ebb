use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vppmux_core::ConnectionEvent;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Outcome of one control ping.
#[derive(Debug, Serialize)]
pub struct PingOutput {
    pub seq: u32,
    pub ok: bool,
    pub vpe_pid: Option<u32>,
    pub client_index: Option<u32>,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct PingSummary<'a> {
    schema_id: &'static str,
    socket: &'a str,
    sent: usize,
    received: usize,
    replies: &'a [PingOutput],
}

pub fn print_pings(socket: &str, pings: &[PingOutput], format: OutputFormat) {
    let received = pings.iter().filter(|p| p.ok).count();
    match format {
        OutputFormat::Json => {
            let out = PingSummary {
                schema_id: "https://schemas.3leaps.dev/vppmux/cli/v1/ping.schema.json",
                socket,
                sent: pings.len(),
                received,
                replies: pings,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "VPE PID", "CLIENT", "LATENCY", "ERROR"]);
            for ping in pings {
                table.add_row(vec![
                    ping.seq.to_string(),
                    opt(ping.vpe_pid),
                    opt(ping.client_index),
                    ping.latency_ms
                        .map(|ms| format!("{ms:.2}ms"))
                        .unwrap_or_else(|| "-".to_string()),
                    ping.error.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{table}");
            println!("{received}/{} replies from {socket}", pings.len());
        }
        OutputFormat::Pretty => {
            for ping in pings {
                match (&ping.error, ping.vpe_pid, ping.latency_ms) {
                    (None, Some(pid), Some(ms)) => {
                        println!(
                            "reply from {socket}: seq={} vpe_pid={pid} time={ms:.2}ms",
                            ping.seq
                        )
                    }
                    (Some(err), _, _) => println!("seq={} failed: {err}", ping.seq),
                    _ => println!("seq={} no reply", ping.seq),
                }
            }
            println!("{received}/{} replies", pings.len());
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    schema_id: &'static str,
    state: String,
    error: Option<String>,
    timestamp: String,
    socket: &'a str,
}

pub fn print_event(socket: &str, event: &ConnectionEvent, format: OutputFormat) {
    let timestamp = unix_seconds(event.timestamp);
    let error = event.error.as_ref().map(ToString::to_string);
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                schema_id: "https://schemas.3leaps.dev/vppmux/cli/v1/connection-event.schema.json",
                state: event.state.to_string(),
                error,
                timestamp,
                socket,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => match error {
            Some(err) => println!("[{timestamp}] {socket}: {} ({err})", event.state),
            None => println!("[{timestamp}] {socket}: {}", event.state),
        },
    }
}

fn opt(value: Option<u32>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn unix_seconds(at: SystemTime) -> String {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
