//! Physical adapters for the VPP binary API.
//!
//! An adapter owns the byte-level link to VPP and nothing else:
//! - It resolves message IDs by name and crc once connected
//! - It sends fully encoded messages, stamped with a context
//! - It pushes every inbound message onto a [`FrameSink`]
//!
//! Two implementations ship with this crate: [`SocketAdapter`] for VPP's
//! binary-API Unix socket and [`MockAdapter`] for tests.

pub mod error;
pub mod frame;
pub mod mock;
pub mod traits;

#[cfg(unix)]
pub mod socket;

pub use error::{AdapterError, Result};
pub use mock::{MessageDto, MockAdapter, MsgWithContext, ReplyHandler};
pub use traits::{FrameSink, RawFrame, VppAdapter};

#[cfg(unix)]
pub use socket::{SocketAdapter, SocketConfig, DEFAULT_SOCKET_PATH};
