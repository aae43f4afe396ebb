//! Control ping messages.
//!
//! The control ping pair is the one part of the binary API the multiplexer
//! itself depends on: it terminates multipart (dump) replies and probes
//! connection liveness.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{get_i32, get_u32};
use crate::error::Result;
use crate::message::{Message, MessageType};

/// Control ping request name.
pub const CONTROL_PING: &str = "control_ping";
/// Control ping reply name.
pub const CONTROL_PING_REPLY: &str = "control_ping_reply";

const CONTROL_PING_CRC: &str = "51077d14";
const CONTROL_PING_REPLY_CRC: &str = "f6b0b8ca";

/// Liveness probe request. Has no body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlPing;

impl Message for ControlPing {
    fn name(&self) -> &'static str {
        CONTROL_PING
    }

    fn crc(&self) -> &'static str {
        CONTROL_PING_CRC
    }

    fn message_type(&self) -> MessageType {
        MessageType::Request
    }

    fn encode_body(&self, _dst: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn decode_body(&mut self, _src: &mut Bytes) -> Result<()> {
        Ok(())
    }
}

/// Liveness probe reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlPingReply {
    pub retval: i32,
    pub client_index: u32,
    pub vpe_pid: u32,
}

impl Message for ControlPingReply {
    fn name(&self) -> &'static str {
        CONTROL_PING_REPLY
    }

    fn crc(&self) -> &'static str {
        CONTROL_PING_REPLY_CRC
    }

    fn message_type(&self) -> MessageType {
        MessageType::Reply
    }

    fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32(self.retval);
        dst.put_u32(self.client_index);
        dst.put_u32(self.vpe_pid);
        Ok(())
    }

    fn decode_body(&mut self, src: &mut Bytes) -> Result<()> {
        self.retval = get_i32(src)?;
        self.client_index = get_u32(src)?;
        self.vpe_pid = get_u32(src)?;
        Ok(())
    }

    fn retval(&self) -> Option<i32> {
        Some(self.retval)
    }
}
