//! Binary API message model for talking to VPP.
//!
//! Every message exchanged with the dataplane carries a small header:
//! - A 2-byte big-endian message ID, assigned by VPP per connection
//! - A client index and/or a 4-byte context, depending on the message type
//!
//! Message bodies are owned by the message types themselves through the
//! [`Message`] trait. This crate never interprets what a message means.

pub mod api_error;
pub mod codec;
pub mod control;
pub mod error;
pub mod message;
pub mod registry;

pub use api_error::{retval_to_error, VppApiError};
pub use codec::{MsgCodec, DEFAULT_MAX_MESSAGE_SIZE};
pub use control::{ControlPing, ControlPingReply, CONTROL_PING, CONTROL_PING_REPLY};
pub use error::{CodecError, Result};
pub use message::{Message, MessageInfo, MessageType};
pub use registry::MessageRegistry;
