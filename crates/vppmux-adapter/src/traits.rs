use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// An inbound message as received from VPP, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub msg_id: u16,
    pub data: Bytes,
}

impl RawFrame {
    pub fn new(msg_id: u16, data: impl Into<Bytes>) -> Self {
        Self {
            msg_id,
            data: data.into(),
        }
    }
}

/// Destination for inbound frames.
///
/// Adapters push every message they read from VPP here. The queue is
/// unbounded so the adapter's reader never blocks on a slow consumer.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::UnboundedSender<RawFrame>,
}

impl FrameSink {
    pub fn new(tx: mpsc::UnboundedSender<RawFrame>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RawFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Push a frame. Returns `false` if the consumer is gone.
    pub fn push(&self, frame: RawFrame) -> bool {
        self.tx.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The physical link to VPP.
///
/// Implementations must be safe to share between the connection's
/// dispatcher, its channel tasks and its health task.
#[async_trait]
pub trait VppAdapter: Send + Sync {
    /// Establish the link and learn the message table.
    async fn connect(&self) -> Result<()>;

    /// Tear the link down. Must be safe to call when not connected.
    async fn disconnect(&self) -> Result<()>;

    /// Wait until VPP is ready to accept a connection.
    async fn wait_ready(&self) -> Result<()>;

    /// Send an encoded message. `context` is stamped into the request header.
    async fn send_msg(&self, context: u32, data: Bytes) -> Result<()>;

    /// Install the destination for inbound frames, replacing any previous one.
    fn set_frame_sink(&self, sink: FrameSink);

    /// Resolve the numeric ID of a message for the current link.
    fn get_msg_id(&self, name: &str, crc: &str) -> Result<u16>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_reports_closed_consumer() {
        let (sink, rx) = FrameSink::channel();
        assert!(sink.push(RawFrame::new(1, vec![0, 1])));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.push(RawFrame::new(1, vec![0, 1])));
    }

    #[tokio::test]
    async fn sink_preserves_order() {
        let (sink, mut rx) = FrameSink::channel();
        for id in 0..5u16 {
            sink.push(RawFrame::new(id, id.to_be_bytes().to_vec()));
        }
        for id in 0..5u16 {
            assert_eq!(rx.recv().await.unwrap().msg_id, id);
        }
    }
}
