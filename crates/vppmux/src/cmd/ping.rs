use std::time::Instant;

use tracing::{debug, warn};
use vppmux_api::{ControlPing, ControlPingReply, MessageRegistry};
use vppmux_core::{Channel, Connection, MuxConfig, MuxError};

use crate::cmd::{parse_timeout, socket_adapter, PingArgs};
use crate::exit::{
    adapter_error, mux_error, CliError, CliResult, HEALTH_CHECK_FAILED, SUCCESS, USAGE,
};
use crate::output::{print_pings, OutputFormat, PingOutput};

pub async fn run(args: PingArgs, format: OutputFormat, config: MuxConfig) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "count must be greater than zero"));
    }
    let timeout = parse_timeout(&args.timeout)?;
    let interval = parse_timeout(&args.interval)?;

    let adapter = socket_adapter(&args.socket, timeout)?;
    adapter
        .wait_ready()
        .await
        .map_err(|err| adapter_error("VPP not ready", err))?;
    let conn = Connection::connect(adapter, MessageRegistry::new(), config)
        .await
        .map_err(|err| mux_error("connect failed", err))?;

    let result = ping_loop(&conn, args.count, interval, timeout).await;
    conn.disconnect().await;
    let pings = result?;

    let socket = args.socket.display().to_string();
    print_pings(&socket, &pings, format);

    let received = pings.iter().filter(|p| p.ok).count();
    match received {
        0 => Err(CliError::new(
            HEALTH_CHECK_FAILED,
            format!("no reply from {socket}"),
        )),
        n if n < pings.len() => Ok(HEALTH_CHECK_FAILED),
        _ => Ok(SUCCESS),
    }
}

async fn ping_loop(
    conn: &Connection,
    count: u32,
    interval: std::time::Duration,
    timeout: std::time::Duration,
) -> CliResult<Vec<PingOutput>> {
    let channel = conn
        .new_api_channel()
        .map_err(|err| mux_error("open channel failed", err))?;
    channel.set_reply_timeout(timeout);

    let mut pings = Vec::with_capacity(count as usize);
    for seq in 1..=count {
        if seq > 1 {
            tokio::time::sleep(interval).await;
        }
        let started = Instant::now();
        match ping_once(&channel).await {
            Ok(reply) => {
                let latency = started.elapsed();
                debug!(seq, ?latency, vpe_pid = reply.vpe_pid, "control ping reply");
                pings.push(PingOutput {
                    seq,
                    ok: true,
                    vpe_pid: Some(reply.vpe_pid),
                    client_index: Some(reply.client_index),
                    latency_ms: Some((latency.as_secs_f64() * 1000.0 * 100.0).round() / 100.0),
                    error: None,
                });
            }
            Err(MuxError::NotConnected) => {
                return Err(CliError::new(
                    crate::exit::TRANSPORT_ERROR,
                    "connection lost while pinging",
                ));
            }
            Err(err) => {
                warn!(seq, error = %err, "control ping failed");
                pings.push(PingOutput {
                    seq,
                    ok: false,
                    vpe_pid: None,
                    client_index: None,
                    latency_ms: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }
    Ok(pings)
}

async fn ping_once(channel: &Channel) -> Result<ControlPingReply, MuxError> {
    let mut reply = ControlPingReply::default();
    channel
        .send_request(ControlPing)
        .await?
        .receive_reply(&mut reply)
        .await?;
    Ok(reply)
}
