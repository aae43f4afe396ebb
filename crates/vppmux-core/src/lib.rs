//! Multiplexed request/reply over a single VPP binary-API link.
//!
//! A [`Connection`] owns the link. Any number of [`Channel`]s share it, each
//! numbering its own requests; replies find their way back through the
//! request context VPP echoes. Unsolicited messages go to notification
//! subscribers instead.
//!
//! ```no_run
//! # async fn run() -> vppmux_core::Result<()> {
//! use std::sync::Arc;
//! use vppmux_adapter::MockAdapter;
//! use vppmux_api::{ControlPing, ControlPingReply, MessageRegistry};
//! use vppmux_core::{Connection, MuxConfig};
//!
//! let conn = Connection::connect(
//!     Arc::new(MockAdapter::new()),
//!     MessageRegistry::new(),
//!     MuxConfig::default(),
//! )
//! .await?;
//! let channel = conn.new_api_channel()?;
//! let mut reply = ControlPingReply::default();
//! channel.send_request(ControlPing).await?.receive_reply(&mut reply).await?;
//! conn.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod context;
mod dispatch;
pub mod error;
pub mod health;
pub mod notification;

pub use channel::{Channel, MultiRequestCtx, RequestCtx};
pub use config::MuxConfig;
pub use connection::{async_connect, connect, Connection};
pub use context::{compare_seq_numbers, pack_request_context, unpack_request_context};
pub use error::{MuxError, Result};
pub use health::{ConnectionEvent, ConnectionState, HealthMonitor, ProbeVerdict};
pub use notification::SubscriptionCtx;
