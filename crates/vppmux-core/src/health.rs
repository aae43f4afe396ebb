//! Background connect and health check loop of `async_connect`.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vppmux_api::{ControlPing, ControlPingReply};

use crate::channel::Channel;
use crate::connection::ConnectionInner;
use crate::error::MuxError;

/// State of the link to VPP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// A change of the connection state.
#[derive(Debug)]
pub struct ConnectionEvent {
    pub timestamp: SystemTime,
    pub state: ConnectionState,
    /// Why the connection was lost, when known.
    pub error: Option<MuxError>,
}

impl ConnectionEvent {
    fn new(state: ConnectionState, error: Option<MuxError>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            state,
            error,
        }
    }
}

/// Outcome of one health check probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Healthy,
    /// First success after one or more timeouts.
    Recovered,
    /// A timeout that is still within the threshold.
    Degraded { failed: u32 },
    /// The threshold is exceeded; the link is considered lost.
    Disconnect,
}

/// Counts consecutive probe timeouts against a threshold.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    threshold: u32,
    failed: u32,
}

impl HealthMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failed: 0,
        }
    }

    pub fn record_success(&mut self) -> ProbeVerdict {
        if self.failed > 0 {
            self.failed = 0;
            ProbeVerdict::Recovered
        } else {
            ProbeVerdict::Healthy
        }
    }

    pub fn record_timeout(&mut self) -> ProbeVerdict {
        self.failed += 1;
        if self.failed > self.threshold {
            ProbeVerdict::Disconnect
        } else {
            ProbeVerdict::Degraded {
                failed: self.failed,
            }
        }
    }

    /// Consecutive timeouts so far.
    pub fn failed(&self) -> u32 {
        self.failed
    }
}

enum LoopExit {
    /// `Connection::disconnect` was called.
    Closed,
    /// The link is considered lost.
    Lost(MuxError),
    /// No probe channel; the link is left alone.
    Disabled,
}

/// Connect, health check, and reconnect until the connection is closed.
pub(crate) async fn connect_loop(
    conn: Arc<ConnectionInner>,
    events: mpsc::Sender<ConnectionEvent>,
) {
    loop {
        if !connect_until_ready(&conn).await {
            break;
        }
        emit(&events, ConnectionEvent::new(ConnectionState::Connected, None)).await;

        match health_check_loop(&conn).await {
            LoopExit::Closed => break,
            LoopExit::Disabled => return,
            LoopExit::Lost(err) => {
                emit(
                    &events,
                    ConnectionEvent::new(ConnectionState::Disconnected, Some(err)),
                )
                .await;
                conn.disconnect_vpp().await;
            }
        }
    }
    debug!("connect loop stopped");
}

/// Retry connecting until it succeeds. Returns `false` if the connection was
/// closed first.
async fn connect_until_ready(conn: &Arc<ConnectionInner>) -> bool {
    loop {
        if conn.is_closed() {
            return false;
        }
        if let Err(err) = conn.adapter.wait_ready().await {
            warn!(error = %err, "wait ready failed");
        }

        // Not raced against shutdown: a half-finished connect could leave
        // the adapter up with nobody left to disconnect it.
        match conn.connect_vpp().await {
            Ok(()) if conn.is_closed() => {
                conn.disconnect_vpp().await;
                return false;
            }
            Ok(()) => return true,
            Err(err) => {
                error!(
                    error = %err,
                    backoff = ?conn.config.reconnect_backoff,
                    "connecting to VPP failed"
                );
            }
        }

        tokio::select! {
            _ = conn.shutdown.cancelled() => return false,
            _ = tokio::time::sleep(conn.config.reconnect_backoff) => {}
        }
    }
}

async fn health_check_loop(conn: &Arc<ConnectionInner>) -> LoopExit {
    let probe = match conn.open_channel(1, 1) {
        Ok(channel) => channel,
        Err(err) if conn.is_closed() => {
            debug!(error = %err, "connection closed before the health check started");
            return LoopExit::Closed;
        }
        Err(err) => {
            error!(error = %err, "failed to create health check channel, health check disabled");
            return LoopExit::Disabled;
        }
    };
    let probe_timeout = conn.config.health_check_reply_timeout;
    probe.set_reply_timeout(probe_timeout);
    let mut monitor = HealthMonitor::new(conn.config.health_check_threshold);

    let exit = loop {
        tokio::select! {
            _ = conn.shutdown.cancelled() => break LoopExit::Closed,
            _ = tokio::time::sleep(conn.config.health_check_probe_interval) => {}
        }
        if conn.is_closed() || !conn.is_connected() {
            debug!("disconnected on request, exiting health check loop");
            break LoopExit::Closed;
        }

        match probe_once(conn, &probe).await {
            Ok(()) => {
                if monitor.record_success() == ProbeVerdict::Recovered {
                    info!("VPP health check probe OK");
                }
            }
            Err(MuxError::ProbeTimeout) => match monitor.record_timeout() {
                ProbeVerdict::Disconnect => {
                    error!(
                        threshold = conn.config.health_check_threshold,
                        "VPP health check exceeded threshold for timeouts, assuming disconnect"
                    );
                    break LoopExit::Lost(MuxError::ProbeTimeout);
                }
                _ => {
                    warn!(
                        timeout = ?probe_timeout,
                        failed = monitor.failed(),
                        "VPP health check probe timed out"
                    );
                }
            },
            Err(err) => {
                if conn.is_closed() {
                    break LoopExit::Closed;
                }
                error!(error = %err, "VPP health check probe failed");
                break LoopExit::Lost(err);
            }
        }
    };

    probe.close();
    exit
}

/// Send one control ping on the probe channel and wait for its reply.
///
/// A reply timeout only counts as a probe timeout when no other channel has
/// received a reply within the probe timeout either.
async fn probe_once(conn: &ConnectionInner, probe: &Channel) -> Result<(), MuxError> {
    probe.drain_reply().await;
    let request = probe.send_request(ControlPing).await?;
    let probe_timeout = conn.config.health_check_reply_timeout;

    loop {
        let mut reply = ControlPingReply::default();
        match request.receive_reply(&mut reply).await {
            Ok(()) => return Ok(()),
            Err(MuxError::ReplyTimeout(_)) => match conn.since_last_reply() {
                Some(since) if since < probe_timeout => {
                    warn!(
                        since = ?since,
                        "VPP health check probe timing out, but another channel got a reply recently, continue waiting"
                    );
                }
                _ => return Err(MuxError::ProbeTimeout),
            },
            Err(err) => return Err(err),
        }
    }
}

async fn emit(events: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) {
    debug!(state = %event.state, "connection state changed");
    if events.send(event).await.is_err() {
        debug!("connection event receiver dropped");
    }
}
