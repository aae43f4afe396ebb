use std::cmp::Ordering;
use std::sync::atomic::{AtomicU16, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use vppmux_api::{retval_to_error, Message};

use crate::connection::ConnectionInner;
use crate::context::compare_seq_numbers;
use crate::error::{MuxError, Result};
use crate::notification::{Subscription, SubscriptionCtx};

/// A request waiting in a channel's outbound queue.
pub(crate) struct VppRequest {
    pub(crate) msg: Box<dyn Message>,
    pub(crate) seq_num: u16,
    pub(crate) multipart: bool,
}

/// A reply routed to a channel, or a local error standing in for one.
#[derive(Debug)]
pub(crate) struct VppReply {
    pub(crate) seq_num: u16,
    pub(crate) msg_id: u16,
    pub(crate) data: Bytes,
    pub(crate) last_of_multipart: bool,
    pub(crate) error: Option<MuxError>,
}

impl VppReply {
    pub(crate) fn error(seq_num: u16, error: MuxError) -> Self {
        Self {
            seq_num,
            msg_id: 0,
            data: Bytes::new(),
            last_of_multipart: false,
            error: Some(error),
        }
    }
}

struct ReplyState {
    rx: mpsc::Receiver<VppReply>,
    /// A reply that arrived ahead of the one being awaited.
    delayed: Option<VppReply>,
}

/// One logical conversation with VPP.
///
/// Requests on a channel are numbered with a wrapping 16-bit sequence number
/// and their replies are matched by it. A channel is meant to be used by one
/// task at a time; use one channel per concurrent caller.
///
/// Dropping the channel closes it.
pub struct Channel {
    id: u16,
    conn: Arc<ConnectionInner>,
    req_tx: Mutex<Option<mpsc::Sender<VppRequest>>>,
    replies: tokio::sync::Mutex<ReplyState>,
    last_seq_num: AtomicU16,
    reply_timeout: Mutex<Duration>,
}

impl Channel {
    pub(crate) fn new(
        id: u16,
        conn: Arc<ConnectionInner>,
        req_tx: mpsc::Sender<VppRequest>,
        reply_rx: mpsc::Receiver<VppReply>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            id,
            conn,
            req_tx: Mutex::new(Some(req_tx)),
            replies: tokio::sync::Mutex::new(ReplyState {
                rx: reply_rx,
                delayed: None,
            }),
            last_seq_num: AtomicU16::new(0),
            reply_timeout: Mutex::new(reply_timeout),
        }
    }

    /// Channel ID, unique among the open channels of a connection.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Queue a request that expects exactly one reply.
    pub async fn send_request(&self, msg: impl Message) -> Result<RequestCtx<'_>> {
        let seq_num = self.enqueue(Box::new(msg), false).await?;
        Ok(RequestCtx {
            channel: self,
            seq_num,
        })
    }

    /// Queue a dump request whose reply is a stream of messages.
    ///
    /// A control ping is sent right behind the request; its reply marks the
    /// end of the stream.
    pub async fn send_multi_request(&self, msg: impl Message) -> Result<MultiRequestCtx<'_>> {
        let seq_num = self.enqueue(Box::new(msg), true).await?;
        Ok(MultiRequestCtx {
            channel: self,
            seq_num,
        })
    }

    /// Deliver every notification of `M` to `queue`.
    ///
    /// `factory` builds the value each notification is decoded into.
    /// Notifications that find the queue full are dropped.
    pub fn subscribe_notification<M, F>(
        &self,
        queue: mpsc::Sender<M>,
        factory: F,
    ) -> Result<SubscriptionCtx>
    where
        M: Message,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.sender()?;
        let sample = factory();
        let msg_id = self.conn.message_id(&sample)?;
        let subscription = Arc::new(Subscription::new(msg_id, &sample, queue, factory));
        self.conn.add_subscription(Arc::clone(&subscription));
        debug!(
            channel = self.id,
            msg_id,
            msg_name = sample.name(),
            "added notification subscription"
        );
        Ok(SubscriptionCtx::new(Arc::clone(&self.conn), subscription))
    }

    /// Timeout applied to each `receive_reply` call.
    pub fn reply_timeout(&self) -> Duration {
        *lock(&self.reply_timeout)
    }

    pub fn set_reply_timeout(&self, timeout: Duration) {
        *lock(&self.reply_timeout) = timeout;
    }

    /// Stop accepting requests and release the channel ID once the queued
    /// requests are sent. Safe to call more than once.
    pub fn close(&self) {
        if lock(&self.req_tx).take().is_some() {
            debug!(channel = self.id, "closing channel");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.req_tx).is_none()
    }

    /// Drop one stale reply left in the queue, if any.
    pub(crate) async fn drain_reply(&self) {
        let mut state = self.replies.lock().await;
        if state.rx.try_recv().is_ok() {
            debug!(channel = self.id, "drained old reply from reply queue");
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<VppRequest>> {
        if self.conn.is_closed() {
            return Err(MuxError::NotConnected);
        }
        lock(&self.req_tx).clone().ok_or(MuxError::ChannelClosed)
    }

    fn closed_error(&self) -> MuxError {
        if self.conn.is_closed() {
            MuxError::NotConnected
        } else {
            MuxError::ChannelClosed
        }
    }

    async fn enqueue(&self, msg: Box<dyn Message>, multipart: bool) -> Result<u16> {
        let tx = self.sender()?;
        let seq_num = self
            .last_seq_num
            .fetch_add(1, AtomicOrdering::SeqCst)
            .wrapping_add(1);
        tx.send(VppRequest {
            msg,
            seq_num,
            multipart,
        })
        .await
        .map_err(|_| self.closed_error())?;
        Ok(seq_num)
    }

    /// Wait for the reply with sequence number `expected` and decode it into
    /// `msg`. Returns `true` when the terminating frame of a multipart reply
    /// was received instead.
    async fn receive_reply_internal(&self, msg: &mut dyn Message, expected: u16) -> Result<bool> {
        let timeout = self.reply_timeout();
        let mut state = self.replies.lock().await;

        if let Some(reply) = state.delayed.take() {
            if let Some(result) = self.process_reply(reply, expected, msg, &mut state.delayed) {
                return result;
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let reply = match tokio::time::timeout_at(deadline, state.rx.recv()).await {
                Ok(Some(reply)) => reply,
                Ok(None) => return Err(self.closed_error()),
                Err(_) => return Err(MuxError::ReplyTimeout(timeout)),
            };
            if let Some(result) = self.process_reply(reply, expected, msg, &mut state.delayed) {
                return result;
            }
        }
    }

    /// Returns `None` when the reply is stale and must be ignored.
    fn process_reply(
        &self,
        reply: VppReply,
        expected: u16,
        msg: &mut dyn Message,
        delayed: &mut Option<VppReply>,
    ) -> Option<Result<bool>> {
        match compare_seq_numbers(reply.seq_num, expected) {
            Ordering::Less => {
                warn!(
                    channel = self.id,
                    seq_num = reply.seq_num,
                    expected,
                    "received reply to an already closed binary API request"
                );
                return None;
            }
            Ordering::Greater => {
                *delayed = Some(reply);
                return Some(Err(MuxError::MissingReply { seq_num: expected }));
            }
            Ordering::Equal => {}
        }

        let VppReply {
            seq_num,
            msg_id,
            data,
            last_of_multipart,
            error,
        } = reply;

        if let Some(err) = error {
            return Some(Err(err));
        }
        if last_of_multipart {
            return Some(Ok(true));
        }
        Some(self.decode_reply(seq_num, msg_id, &data, msg).map(|()| false))
    }

    fn decode_reply(
        &self,
        seq_num: u16,
        msg_id: u16,
        data: &Bytes,
        msg: &mut dyn Message,
    ) -> Result<()> {
        let expected = self.conn.message_id(msg)?;
        if msg_id != expected {
            let got_name = match self.conn.lookup_by_id(msg_id) {
                Ok(info) => info.name_with_crc(),
                Err(err) => err.to_string(),
            };
            return Err(MuxError::InvalidMessageId {
                seq_num,
                expected,
                expected_name: msg.name().to_string(),
                got: msg_id,
                got_name,
            });
        }

        self.conn.codec.decode_msg(data, msg)?;

        if msg.name().ends_with("_reply") {
            if let Some(retval) = msg.retval() {
                retval_to_error(retval)?;
            }
        }
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Handle for the reply to a single request.
#[derive(Debug)]
pub struct RequestCtx<'a> {
    channel: &'a Channel,
    seq_num: u16,
}

impl RequestCtx<'_> {
    /// Wait for the reply and decode it into `msg`.
    pub async fn receive_reply(&self, msg: &mut dyn Message) -> Result<()> {
        let last = self
            .channel
            .receive_reply_internal(msg, self.seq_num)
            .await?;
        if last {
            return Err(MuxError::UnexpectedMultipart);
        }
        Ok(())
    }

    pub fn seq_num(&self) -> u16 {
        self.seq_num
    }
}

/// Handle for the stream of replies to a dump request.
#[derive(Debug)]
pub struct MultiRequestCtx<'a> {
    channel: &'a Channel,
    seq_num: u16,
}

impl MultiRequestCtx<'_> {
    /// Decode the next part into `msg`. Returns `true` once the stream has
    /// ended, in which case `msg` is left untouched.
    pub async fn receive_reply(&self, msg: &mut dyn Message) -> Result<bool> {
        self.channel
            .receive_reply_internal(msg, self.seq_num)
            .await
    }

    pub fn seq_num(&self) -> u16 {
        self.seq_num
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
