use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// Kind of a binary API message. Determines the header layout on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Sent by the client: `msg_id | client_index | context`.
    Request,
    /// Sent by VPP in response to a request: `msg_id | context`.
    Reply,
    /// Sent by VPP unsolicited: `msg_id | client_index`.
    Event,
    /// Anything else: `msg_id` only.
    Other,
}

impl MessageType {
    /// Size of the header preceding the message body.
    pub fn header_len(self) -> usize {
        match self {
            MessageType::Request => 10,
            MessageType::Reply => 6,
            MessageType::Event => 6,
            MessageType::Other => 2,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Request => "request",
            MessageType::Reply => "reply",
            MessageType::Event => "event",
            MessageType::Other => "other",
        };
        f.write_str(name)
    }
}

/// A binary API message.
///
/// Implemented by every generated or hand-written message type. The crc acts
/// as a signature: VPP only resolves a message ID when both name and crc
/// match its own definition.
pub trait Message: fmt::Debug + Send + Sync + 'static {
    /// Message name as known to VPP, e.g. `control_ping`.
    fn name(&self) -> &'static str;

    /// Signature of the message definition.
    fn crc(&self) -> &'static str;

    /// Header layout of the message.
    fn message_type(&self) -> MessageType;

    /// Append the message body (everything after the header) to `dst`.
    fn encode_body(&self, dst: &mut BytesMut) -> Result<()>;

    /// Overwrite `self` with the body read from `src`.
    fn decode_body(&mut self, src: &mut Bytes) -> Result<()>;

    /// Return value carried by the message, if it has one.
    ///
    /// Replies conventionally carry a `retval` field where non-zero means
    /// failure.
    fn retval(&self) -> Option<i32> {
        None
    }
}

/// Static identity of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageInfo {
    pub name: &'static str,
    pub crc: &'static str,
    pub kind: MessageType,
}

impl MessageInfo {
    /// Identity of the given message instance.
    pub fn of(msg: &dyn Message) -> Self {
        Self {
            name: msg.name(),
            crc: msg.crc(),
            kind: msg.message_type(),
        }
    }

    /// `name_crc` key used to look the message up in ID tables.
    pub fn name_with_crc(&self) -> String {
        format!("{}_{}", self.name, self.crc)
    }
}

impl fmt::Display for MessageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.crc)
    }
}
