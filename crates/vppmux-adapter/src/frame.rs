use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AdapterError, Result};

/// Socket frame header: q (8) + length (4) + gc_mark (4) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Default maximum message size carried in one frame: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = vppmux_api::DEFAULT_MAX_MESSAGE_SIZE;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Encode one binary API message into the socket wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────────┬───────────────┬──────────────────┐
/// │ q (8B)     │ Length       │ gc_mark (4B)  │ Message          │
/// │ always 0   │ (4B BE)      │ always 0      │ (Length bytes)   │
/// └────────────┴──────────────┴───────────────┴──────────────────┘
/// ```
pub fn encode_frame(msg: &[u8], dst: &mut BytesMut, max_frame_size: usize) -> Result<()> {
    if msg.len() > max_frame_size || msg.len() > u32::MAX as usize {
        return Err(AdapterError::FrameTooLarge {
            size: msg.len(),
            max: max_frame_size,
        });
    }
    dst.reserve(HEADER_SIZE + msg.len());
    dst.put_u64(0);
    dst.put_u32(msg.len() as u32);
    dst.put_u32(0);
    dst.put_slice(msg);
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[8], src[9], src[10], src[11]]) as usize;
    if len > max_frame_size {
        return Err(AdapterError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    if src.len() < HEADER_SIZE + len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

/// Reads complete messages from the socket.
///
/// Handles partial reads internally; callers always get complete messages.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_frame_size,
        }
    }

    /// Read the next complete message.
    ///
    /// Returns `Err(AdapterError::ConnectionClosed)` when EOF is reached.
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(msg) = decode_frame(&mut self.buf, self.max_frame_size)? {
                return Ok(msg);
            }

            let read = self.inner.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Err(AdapterError::ConnectionClosed);
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes messages to the socket, one frame per message.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_frame_size,
        }
    }

    /// Write one message and flush it.
    pub async fn write_frame(&mut self, msg: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(msg, &mut self.buf, self.max_frame_size)?;
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the link.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let mut buf = BytesMut::new();
        encode_frame(b"abc", &mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 3);
        assert_eq!(&buf[0..8], &[0; 8]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 3]);
        assert_eq!(&buf[12..16], &[0; 4]);
        assert_eq!(&buf[16..], b"abc");
    }

    #[test]
    fn decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0u8; 10][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn decode_incomplete_message() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn decode_back_to_back_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap();
        encode_frame(b"second", &mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap();

        let first = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        let second = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(first.as_ref(), b"first");
        assert_eq!(second.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_frames_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame(&[0u8; 32], &mut buf, 16).unwrap_err();
        assert!(matches!(err, AdapterError::FrameTooLarge { size: 32, max: 16 }));

        let mut wire = BytesMut::new();
        encode_frame(&[0u8; 32], &mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap();
        let err = decode_frame(&mut wire, 16).unwrap_err();
        assert!(matches!(err, AdapterError::FrameTooLarge { size: 32, max: 16 }));
    }

    #[tokio::test]
    async fn reader_and_writer_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client, DEFAULT_MAX_FRAME_SIZE);
        let mut reader = FrameReader::new(server, DEFAULT_MAX_FRAME_SIZE);

        let payload = vec![7u8; 200];
        let expected = payload.clone();
        let write = tokio::spawn(async move {
            writer.write_frame(&payload).await.unwrap();
            writer.write_frame(b"tail").await.unwrap();
        });

        assert_eq!(reader.read_frame().await.unwrap().as_ref(), &expected[..]);
        assert_eq!(reader.read_frame().await.unwrap().as_ref(), b"tail");
        write.await.unwrap();
    }

    #[tokio::test]
    async fn reader_reports_closed_link() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server, DEFAULT_MAX_FRAME_SIZE);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, AdapterError::ConnectionClosed));
    }
}
