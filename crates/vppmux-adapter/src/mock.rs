//! In-memory adapter for tests that do not need a running VPP.
//!
//! Replies are produced in one of two modes:
//! - Queue mode: each outgoing message pops one queued reply set
//! - Handler mode: registered handlers compute a reply, newest first
//!
//! With nothing queued and no handler answering, control pings get a control
//! ping reply and every other request gets a bare reply with message ID 1.
//!
//! A multipart request is two outgoing messages (the request and the control
//! ping that terminates it), so queue mode needs two reply sets for it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};
use vppmux_api::codec::peek_msg_id;
use vppmux_api::{
    ControlPingReply, Message, MessageType, MsgCodec, CONTROL_PING, CONTROL_PING_REPLY,
};

use crate::error::{AdapterError, Result};
use crate::traits::{FrameSink, RawFrame, VppAdapter};

/// Message ID the mock assigns to `control_ping`.
pub const CONTROL_PING_ID: u16 = 100;
/// Message ID the mock assigns to `control_ping_reply`.
pub const CONTROL_PING_REPLY_ID: u16 = 101;
/// Message ID of the default reply.
pub const DEFAULT_REPLY_ID: u16 = 1;

const FIRST_DYNAMIC_ID: u16 = 1000;
const MOCK_VPE_PID: u32 = 4242;

/// A reply whose sequence number and multipart flag are chosen by the test
/// rather than copied from the request.
#[derive(Debug)]
pub struct MsgWithContext {
    pub msg: Box<dyn Message>,
    pub seq_num: u16,
    pub multipart: bool,
}

impl MsgWithContext {
    pub fn new(msg: impl Message, seq_num: u16, multipart: bool) -> Self {
        Self {
            msg: Box::new(msg),
            seq_num,
            multipart,
        }
    }
}

/// An outgoing message as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDto {
    pub msg_id: u16,
    pub msg_name: String,
    pub context: u32,
    pub data: Bytes,
}

/// Computes a reply for a request. Returning `None` passes the request on.
pub type ReplyHandler = Box<dyn Fn(&MessageDto) -> Option<RawFrame> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyMode {
    Default,
    Queue,
    Handlers,
}

#[derive(Debug)]
struct QueuedReply {
    msg: Box<dyn Message>,
    context: Option<(u16, bool)>,
}

struct ReplyState {
    mode: ReplyMode,
    queue: VecDeque<Vec<QueuedReply>>,
    handlers: Vec<ReplyHandler>,
}

struct MsgIds {
    seq: u16,
    by_name: HashMap<String, u16>,
    by_id: HashMap<u16, String>,
}

/// Mock VPP adapter.
pub struct MockAdapter {
    codec: MsgCodec,
    ids: Mutex<MsgIds>,
    replies: Mutex<ReplyState>,
    sink: Mutex<Option<FrameSink>>,
    rejected: Mutex<HashSet<String>>,
    sent: Mutex<Vec<MessageDto>>,
    connected: AtomicBool,
    muted: AtomicBool,
    fail_sends: AtomicBool,
    fail_connects: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            codec: MsgCodec::new(),
            ids: Mutex::new(MsgIds {
                seq: FIRST_DYNAMIC_ID,
                by_name: HashMap::new(),
                by_id: HashMap::new(),
            }),
            replies: Mutex::new(ReplyState {
                mode: ReplyMode::Default,
                queue: VecDeque::new(),
                handlers: Vec::new(),
            }),
            sink: Mutex::new(None),
            rejected: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            fail_connects: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Queue one reply set (one message, or all parts of a multipart reply)
    /// for the next outgoing message. Replies echo the request context.
    pub fn mock_reply(&self, msgs: Vec<Box<dyn Message>>) {
        let set = msgs
            .into_iter()
            .map(|msg| QueuedReply { msg, context: None })
            .collect();
        self.push_reply_set(set);
    }

    /// Like [`MockAdapter::mock_reply`], but with an explicit sequence number
    /// and multipart flag. The channel ID is still taken from the request.
    pub fn mock_reply_with_context(&self, msgs: Vec<MsgWithContext>) {
        let set = msgs
            .into_iter()
            .map(|m| QueuedReply {
                msg: m.msg,
                context: Some((m.seq_num, m.multipart)),
            })
            .collect();
        self.push_reply_set(set);
    }

    /// Register a reply handler and switch to handler mode.
    pub fn mock_reply_handler(&self, handler: ReplyHandler) {
        let mut state = lock(&self.replies);
        state.handlers.push(handler);
        state.mode = ReplyMode::Handlers;
    }

    /// While muted, outgoing messages are accepted but never answered.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    /// Make every `send_msg` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every `connect` fail.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make `get_msg_id` fail for the named message.
    pub fn reject_message(&self, name: &str) {
        lock(&self.rejected).insert(name.to_string());
    }

    /// Push an arbitrary frame to the installed sink.
    pub fn inject(&self, frame: RawFrame) -> bool {
        match lock(&self.sink).as_ref() {
            Some(sink) => sink.push(frame),
            None => false,
        }
    }

    /// Encode `msg` with its mock ID and push it to the installed sink.
    pub fn inject_msg(&self, msg: &dyn Message, context: u32) -> Result<bool> {
        let msg_id = self.get_msg_id(msg.name(), msg.crc())?;
        let data = self.codec.encode_msg_with_context(msg, msg_id, context)?;
        Ok(self.inject(RawFrame::new(msg_id, data)))
    }

    /// Name the mock assigned to a message ID.
    pub fn msg_name(&self, msg_id: u16) -> Option<String> {
        match msg_id {
            CONTROL_PING_ID => Some(CONTROL_PING.to_string()),
            CONTROL_PING_REPLY_ID => Some(CONTROL_PING_REPLY.to_string()),
            _ => lock(&self.ids).by_id.get(&msg_id).cloned(),
        }
    }

    /// Every message sent through the mock, oldest first.
    pub fn sent(&self) -> Vec<MessageDto> {
        lock(&self.sent).clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn push_reply_set(&self, set: Vec<QueuedReply>) {
        let mut state = lock(&self.replies);
        state.queue.push_back(set);
        state.mode = ReplyMode::Queue;
    }

    fn replies_for(&self, request: &MessageDto) -> Result<Vec<RawFrame>> {
        let mut state = lock(&self.replies);

        if state.mode == ReplyMode::Handlers {
            for handler in state.handlers.iter().rev() {
                if let Some(frame) = handler(request) {
                    return Ok(vec![frame]);
                }
            }
        }

        if state.mode != ReplyMode::Default {
            if let Some(set) = state.queue.pop_front() {
                if state.queue.is_empty() && !state.handlers.is_empty() {
                    state.mode = ReplyMode::Handlers;
                }
                drop(state);
                return set
                    .into_iter()
                    .map(|reply| self.encode_queued(reply, request.context))
                    .collect();
            }
        }
        drop(state);

        if request.msg_id == CONTROL_PING_ID {
            let reply = ControlPingReply {
                retval: 0,
                client_index: 0,
                vpe_pid: MOCK_VPE_PID,
            };
            let data =
                self.codec
                    .encode_msg_with_context(&reply, CONTROL_PING_REPLY_ID, request.context)?;
            return Ok(vec![RawFrame::new(CONTROL_PING_REPLY_ID, data)]);
        }

        let mut data = BytesMut::with_capacity(MessageType::Reply.header_len() + 4);
        data.put_u16(DEFAULT_REPLY_ID);
        data.put_u32(request.context);
        data.put_i32(0);
        Ok(vec![RawFrame::new(DEFAULT_REPLY_ID, data.freeze())])
    }

    fn encode_queued(&self, reply: QueuedReply, request_context: u32) -> Result<RawFrame> {
        let context = match reply.context {
            Some((seq_num, multipart)) => {
                (request_context & 0xfffe_0000) | (u32::from(multipart) << 16) | u32::from(seq_num)
            }
            None => request_context,
        };
        let msg_id = self.get_msg_id(reply.msg.name(), reply.msg.crc())?;
        let data = self
            .codec
            .encode_msg_with_context(reply.msg.as_ref(), msg_id, context)?;
        Ok(RawFrame::new(msg_id, data))
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("connected", &self.is_connected())
            .field("sent", &self.sent_count())
            .finish()
    }
}

#[async_trait]
impl VppAdapter for MockAdapter {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(AdapterError::Mock("connect refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!("mock adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        debug!("mock adapter disconnected");
        Ok(())
    }

    async fn wait_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn send_msg(&self, context: u32, data: Bytes) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(AdapterError::Mock("send failed".to_string()));
        }
        if !self.is_connected() {
            return Err(AdapterError::NotConnected);
        }

        let msg_id = peek_msg_id(&data)?;
        let request = MessageDto {
            msg_id,
            msg_name: self.msg_name(msg_id).unwrap_or_default(),
            context,
            data,
        };
        trace!(msg_id, context, name = %request.msg_name, "mock adapter received message");
        lock(&self.sent).push(request.clone());

        if self.muted.load(Ordering::SeqCst) {
            return Ok(());
        }

        for frame in self.replies_for(&request)? {
            if !self.inject(frame) {
                warn!(msg_id, "mock adapter has no frame sink; reply dropped");
            }
        }
        Ok(())
    }

    fn set_frame_sink(&self, sink: FrameSink) {
        *lock(&self.sink) = Some(sink);
    }

    fn get_msg_id(&self, name: &str, crc: &str) -> Result<u16> {
        if lock(&self.rejected).contains(name) {
            return Err(AdapterError::UnknownMessage {
                name: name.to_string(),
                crc: crc.to_string(),
            });
        }
        match name {
            CONTROL_PING => return Ok(CONTROL_PING_ID),
            CONTROL_PING_REPLY => return Ok(CONTROL_PING_REPLY_ID),
            _ => {}
        }

        let mut ids = lock(&self.ids);
        if let Some(id) = ids.by_name.get(name) {
            return Ok(*id);
        }
        ids.seq = ids.seq.wrapping_add(1);
        let id = ids.seq;
        ids.by_name.insert(name.to_string(), id);
        ids.by_id.insert(id, name.to_string());
        Ok(id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
