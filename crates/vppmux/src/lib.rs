//! Multiplexed request/reply client for the VPP binary API.
//!
//! Many independent callers share one connection to VPP. Each caller opens a
//! [`Channel`], sends typed requests, and receives the matching replies;
//! unsolicited notifications are fanned out to subscribers.
//!
//! # Crate Structure
//!
//! - [`api`]: message trait, registry, codec, control ping, VPP API errors
//! - [`adapter`]: the physical link (Unix socket, in-memory mock)
//! - [`mux`]: connections, channels, notifications, health checking

/// Re-export binary API message types.
pub mod api {
    pub use vppmux_api::*;
}

/// Re-export adapter types.
pub mod adapter {
    pub use vppmux_adapter::*;
}

/// Re-export connection and channel types.
pub mod mux {
    pub use vppmux_core::*;
}

pub use vppmux_core::{
    async_connect, connect, Channel, Connection, ConnectionEvent, ConnectionState, MuxConfig,
    MuxError, Result,
};
