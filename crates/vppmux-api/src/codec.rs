use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::message::{Message, MessageType};

/// Default maximum encoded message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 64;

/// Encodes and decodes binary API messages.
///
/// Wire format (all integers big-endian):
/// ```text
/// Request: ┌────────────┬──────────────────┬──────────────┬──────┐
///          │ msg_id (2) │ client_index (4) │ context (4)  │ body │
///          └────────────┴──────────────────┴──────────────┴──────┘
/// Reply:   ┌────────────┬──────────────┬──────┐
///          │ msg_id (2) │ context (4)  │ body │
///          └────────────┴──────────────┴──────┘
/// Event:   ┌────────────┬──────────────────┬──────┐
///          │ msg_id (2) │ client_index (4) │ body │
///          └────────────┴──────────────────┴──────┘
/// ```
#[derive(Debug, Clone)]
pub struct MsgCodec {
    max_message_size: usize,
}

impl MsgCodec {
    /// Create a codec with the default size limit.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec with an explicit size limit.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Encode a message with a zero context. The adapter fills in the real one.
    pub fn encode_msg(&self, msg: &dyn Message, msg_id: u16) -> Result<Bytes> {
        self.encode_msg_with_context(msg, msg_id, 0)
    }

    /// Encode a message, placing `context` where its header expects one.
    pub fn encode_msg_with_context(
        &self,
        msg: &dyn Message,
        msg_id: u16,
        context: u32,
    ) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);
        dst.put_u16(msg_id);
        match msg.message_type() {
            MessageType::Request => {
                dst.put_u32(0);
                dst.put_u32(context);
            }
            MessageType::Reply => dst.put_u32(context),
            MessageType::Event => dst.put_u32(0),
            MessageType::Other => {}
        }
        msg.encode_body(&mut dst)?;

        if dst.len() > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: dst.len(),
                max: self.max_message_size,
            });
        }
        Ok(dst.freeze())
    }

    /// Decode the body of `data` into `msg`.
    pub fn decode_msg(&self, data: &Bytes, msg: &mut dyn Message) -> Result<()> {
        let header_len = msg.message_type().header_len();
        ensure(data.len(), header_len)?;
        let mut body = data.slice(header_len..);
        msg.decode_body(&mut body)
    }

    /// Extract the context of a message of the given kind.
    ///
    /// Requests and replies carry the context at different offsets; events and
    /// other messages have none and yield zero.
    pub fn decode_msg_context(&self, data: &[u8], kind: MessageType) -> Result<u32> {
        let offset = match kind {
            MessageType::Request => 6,
            MessageType::Reply => 2,
            MessageType::Event | MessageType::Other => return Ok(0),
        };
        ensure(data.len(), offset + 4)?;
        Ok(u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]))
    }

    /// Maximum encoded message size accepted by this codec.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for MsgCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the message ID from the first two bytes of an encoded message.
pub fn peek_msg_id(data: &[u8]) -> Result<u16> {
    ensure(data.len(), 2)?;
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

fn ensure(available: usize, needed: usize) -> Result<()> {
    if available < needed {
        return Err(CodecError::Truncated { needed, available });
    }
    Ok(())
}

/// Read a `u8` body field.
pub fn get_u8(src: &mut Bytes) -> Result<u8> {
    ensure(src.remaining(), 1)?;
    Ok(src.get_u8())
}

/// Read a big-endian `u16` body field.
pub fn get_u16(src: &mut Bytes) -> Result<u16> {
    ensure(src.remaining(), 2)?;
    Ok(src.get_u16())
}

/// Read a big-endian `u32` body field.
pub fn get_u32(src: &mut Bytes) -> Result<u32> {
    ensure(src.remaining(), 4)?;
    Ok(src.get_u32())
}

/// Read a big-endian `i32` body field.
pub fn get_i32(src: &mut Bytes) -> Result<i32> {
    ensure(src.remaining(), 4)?;
    Ok(src.get_i32())
}

/// Read a big-endian `u64` body field.
pub fn get_u64(src: &mut Bytes) -> Result<u64> {
    ensure(src.remaining(), 8)?;
    Ok(src.get_u64())
}

/// Read a NUL-padded string occupying exactly `len` bytes.
pub fn get_fixed_str(src: &mut Bytes, len: usize, field: &'static str) -> Result<String> {
    ensure(src.remaining(), len)?;
    let raw = src.split_to(len);
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::to_string)
        .map_err(|_| CodecError::InvalidString { field })
}

/// Write `value` NUL-padded into exactly `len` bytes.
pub fn put_fixed_str(
    dst: &mut BytesMut,
    value: &str,
    len: usize,
    field: &'static str,
) -> Result<()> {
    if value.len() > len {
        return Err(CodecError::FieldTooLong {
            field,
            len: value.len(),
            max: len,
        });
    }
    dst.put_slice(value.as_bytes());
    dst.put_bytes(0, len - value.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlPing, ControlPingReply};

    #[derive(Debug, Default)]
    struct InterfaceEvent {
        sw_if_index: u32,
        admin_up: u8,
    }

    impl Message for InterfaceEvent {
        fn name(&self) -> &'static str {
            "sw_interface_event"
        }
        fn crc(&self) -> &'static str {
            "d1bb2fe4"
        }
        fn message_type(&self) -> MessageType {
            MessageType::Event
        }
        fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
            dst.put_u32(self.sw_if_index);
            dst.put_u8(self.admin_up);
            Ok(())
        }
        fn decode_body(&mut self, src: &mut Bytes) -> Result<()> {
            self.sw_if_index = get_u32(src)?;
            self.admin_up = get_u8(src)?;
            Ok(())
        }
    }

    #[test]
    fn request_header_layout() {
        let codec = MsgCodec::new();
        let data = codec
            .encode_msg_with_context(&ControlPing, 100, 0x0003_0007)
            .unwrap();

        assert_eq!(data.len(), 10);
        assert_eq!(peek_msg_id(&data).unwrap(), 100);
        assert_eq!(&data[2..6], &[0, 0, 0, 0]);
        assert_eq!(
            codec.decode_msg_context(&data, MessageType::Request).unwrap(),
            0x0003_0007
        );
    }

    #[test]
    fn reply_decodes_body_and_context() {
        let codec = MsgCodec::new();
        let reply = ControlPingReply {
            retval: -3,
            client_index: 9,
            vpe_pid: 4242,
        };
        let data = codec.encode_msg_with_context(&reply, 101, 77).unwrap();
        assert_eq!(
            codec.decode_msg_context(&data, MessageType::Reply).unwrap(),
            77
        );

        let mut decoded = ControlPingReply::default();
        codec.decode_msg(&data, &mut decoded).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn event_context_is_always_zero() {
        let codec = MsgCodec::new();
        let event = InterfaceEvent {
            sw_if_index: 5,
            admin_up: 1,
        };
        let data = codec.encode_msg_with_context(&event, 300, 99).unwrap();

        assert_eq!(
            codec.decode_msg_context(&data, MessageType::Event).unwrap(),
            0
        );
        let mut decoded = InterfaceEvent::default();
        codec.decode_msg(&data, &mut decoded).unwrap();
        assert_eq!(decoded.sw_if_index, 5);
        assert_eq!(decoded.admin_up, 1);
    }

    #[test]
    fn truncated_body_is_rejected() {
        let codec = MsgCodec::new();
        let data = Bytes::from_static(&[0, 101, 0, 0, 0, 1, 0, 0]);
        let mut reply = ControlPingReply::default();
        let err = codec.decode_msg(&data, &mut reply).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { needed: 4, .. }));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let codec = MsgCodec::new();
        let err = codec
            .decode_msg_context(&[0, 1, 0], MessageType::Reply)
            .unwrap_err();
        assert!(matches!(err, CodecError::Truncated { needed: 6, .. }));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let codec = MsgCodec::with_max_message_size(4);
        let err = codec.encode_msg(&ControlPing, 100).unwrap_err();
        assert!(matches!(err, CodecError::MessageTooLarge { size: 10, max: 4 }));
    }

    #[test]
    fn fixed_strings_are_nul_padded() {
        let mut dst = BytesMut::new();
        put_fixed_str(&mut dst, "vppmux", 16, "name").unwrap();
        assert_eq!(dst.len(), 16);

        let mut src = dst.freeze();
        assert_eq!(get_fixed_str(&mut src, 16, "name").unwrap(), "vppmux");
        assert!(src.is_empty());
    }

    #[test]
    fn fixed_string_too_long() {
        let mut dst = BytesMut::new();
        let err = put_fixed_str(&mut dst, "abcdef", 4, "name").unwrap_err();
        assert!(matches!(err, CodecError::FieldTooLong { len: 6, max: 4, .. }));
    }

    #[test]
    fn invalid_utf8_string() {
        let mut src = Bytes::from_static(&[0xff, 0xfe, 0, 0]);
        let err = get_fixed_str(&mut src, 4, "name").unwrap_err();
        assert!(matches!(err, CodecError::InvalidString { field: "name" }));
    }
}
