use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vppmux_api::codec::{get_fixed_str, get_i32, get_u16, get_u32, peek_msg_id, put_fixed_str};
use vppmux_api::{CodecError, Message, MessageType, MsgCodec};

use crate::error::{AdapterError, Result};
use crate::frame::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_SIZE};
use crate::traits::{FrameSink, RawFrame, VppAdapter};

/// Default location of VPP's binary-API socket.
pub const DEFAULT_SOCKET_PATH: &str = "/run/vpp/api.sock";

/// Fixed message ID of `sockclnt_create`. It is sent before the message
/// table is known, so VPP reserves this ID for it.
pub const SOCKCLNT_CREATE_ID: u16 = 15;

const SOCKCLNT_DELETE_PREFIX: &str = "sockclnt_delete_";
const CREATE_CONTEXT: u32 = 0x7c;
const NAME_LEN: usize = 64;
const WAIT_READY_POLL: Duration = Duration::from_millis(50);

/// Configuration for [`SocketAdapter`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Path of the binary-API socket.
    pub path: PathBuf,
    /// Name VPP records for this client.
    pub client_name: String,
    /// Bound on connecting and on the registration exchange.
    pub connect_timeout: Duration,
    /// How long `wait_ready` waits for the socket to appear.
    pub max_wait_ready: Duration,
    /// Largest message accepted in either direction.
    pub max_frame_size: usize,
}

impl SocketConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SOCKET_PATH),
            client_name: "vppmux".to_string(),
            connect_timeout: Duration::from_secs(3),
            max_wait_ready: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Client registration request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SockclntCreate {
    pub name: String,
}

impl Message for SockclntCreate {
    fn name(&self) -> &'static str {
        "sockclnt_create"
    }

    fn crc(&self) -> &'static str {
        "455fb9c4"
    }

    fn message_type(&self) -> MessageType {
        MessageType::Request
    }

    fn encode_body(&self, dst: &mut BytesMut) -> vppmux_api::Result<()> {
        put_fixed_str(dst, &self.name, NAME_LEN, "name")
    }

    fn decode_body(&mut self, src: &mut Bytes) -> vppmux_api::Result<()> {
        self.name = get_fixed_str(src, NAME_LEN, "name")?;
        Ok(())
    }
}

/// One row of the message table: `name_crc` and its ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTableEntry {
    pub index: u16,
    pub name: String,
}

/// Client registration reply carrying the message table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SockclntCreateReply {
    pub response: i32,
    pub index: u32,
    pub message_table: Vec<MessageTableEntry>,
}

impl Message for SockclntCreateReply {
    fn name(&self) -> &'static str {
        "sockclnt_create_reply"
    }

    fn crc(&self) -> &'static str {
        "35166268"
    }

    fn message_type(&self) -> MessageType {
        MessageType::Reply
    }

    fn encode_body(&self, dst: &mut BytesMut) -> vppmux_api::Result<()> {
        let count =
            u16::try_from(self.message_table.len()).map_err(|_| CodecError::FieldTooLong {
                field: "message_table",
                len: self.message_table.len(),
                max: u16::MAX as usize,
            })?;
        dst.put_i32(self.response);
        dst.put_u32(self.index);
        dst.put_u16(count);
        for entry in &self.message_table {
            dst.put_u16(entry.index);
            put_fixed_str(dst, &entry.name, NAME_LEN, "message_table.name")?;
        }
        Ok(())
    }

    fn decode_body(&mut self, src: &mut Bytes) -> vppmux_api::Result<()> {
        self.response = get_i32(src)?;
        self.index = get_u32(src)?;
        let count = get_u16(src)?;
        self.message_table = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = get_u16(src)?;
            let name = get_fixed_str(src, NAME_LEN, "message_table.name")?;
            self.message_table.push(MessageTableEntry { index, name });
        }
        Ok(())
    }

    fn retval(&self) -> Option<i32> {
        Some(self.response)
    }
}

/// Client deregistration request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockclntDelete {
    pub index: u32,
}

impl Message for SockclntDelete {
    fn name(&self) -> &'static str {
        "sockclnt_delete"
    }

    fn crc(&self) -> &'static str {
        "8ac76db6"
    }

    fn message_type(&self) -> MessageType {
        MessageType::Request
    }

    fn encode_body(&self, dst: &mut BytesMut) -> vppmux_api::Result<()> {
        dst.put_u32(self.index);
        Ok(())
    }

    fn decode_body(&mut self, src: &mut Bytes) -> vppmux_api::Result<()> {
        self.index = get_u32(src)?;
        Ok(())
    }
}

/// Adapter for VPP's binary-API Unix socket.
///
/// On connect the client registers with `sockclnt_create` and receives the
/// message table used by [`VppAdapter::get_msg_id`]. A reader task then
/// forwards every inbound message to the installed frame sink.
pub struct SocketAdapter {
    config: SocketConfig,
    codec: MsgCodec,
    sink: Arc<Mutex<Option<FrameSink>>>,
    writer: tokio::sync::Mutex<Option<FrameWriter<OwnedWriteHalf>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    client_index: AtomicU32,
    msg_table: RwLock<HashMap<String, u16>>,
}

impl SocketAdapter {
    pub fn new(config: SocketConfig) -> Self {
        let codec = MsgCodec::with_max_message_size(config.max_frame_size);
        Self {
            config,
            codec,
            sink: Arc::new(Mutex::new(None)),
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            client_index: AtomicU32::new(0),
            msg_table: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Client index assigned by VPP on the last successful connect.
    pub fn client_index(&self) -> u32 {
        self.client_index.load(Ordering::SeqCst)
    }

    /// Number of entries in the current message table.
    pub fn message_count(&self) -> usize {
        read_lock(&self.msg_table).len()
    }

    async fn register_client(
        &self,
        reader: &mut FrameReader<OwnedReadHalf>,
        writer: &mut FrameWriter<OwnedWriteHalf>,
    ) -> Result<SockclntCreateReply> {
        let create = SockclntCreate {
            name: self.config.client_name.clone(),
        };
        let data = self
            .codec
            .encode_msg_with_context(&create, SOCKCLNT_CREATE_ID, CREATE_CONTEXT)?;
        writer.write_frame(&data).await?;

        let data = tokio::time::timeout(self.config.connect_timeout, reader.read_frame())
            .await
            .map_err(|_| AdapterError::Timeout {
                operation: "sockclnt_create_reply",
                after: self.config.connect_timeout,
            })??;

        let mut reply = SockclntCreateReply::default();
        self.codec.decode_msg(&data, &mut reply)?;
        if reply.response != 0 {
            return Err(AdapterError::Handshake(format!(
                "sockclnt_create rejected with retval {}",
                reply.response
            )));
        }
        Ok(reply)
    }

    async fn unregister_client(&self, writer: &mut FrameWriter<OwnedWriteHalf>) -> Result<()> {
        let msg_id = read_lock(&self.msg_table)
            .iter()
            .find(|(name, _)| name.starts_with(SOCKCLNT_DELETE_PREFIX))
            .map(|(_, id)| *id)
            .ok_or_else(|| AdapterError::UnknownMessage {
                name: "sockclnt_delete".to_string(),
                crc: String::new(),
            })?;

        let index = self.client_index();
        let data = self.codec.encode_msg(&SockclntDelete { index }, msg_id)?;
        writer.write_frame(&stamp_header(&data, index, 0)).await
    }
}

impl std::fmt::Debug for SocketAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketAdapter")
            .field("path", &self.config.path)
            .field("client_index", &self.client_index())
            .finish()
    }
}

#[async_trait]
impl VppAdapter for SocketAdapter {
    async fn connect(&self) -> Result<()> {
        let mut writer_slot = self.writer.lock().await;
        let path = &self.config.path;
        if writer_slot.is_some() {
            debug!(?path, "already connected to VPP API socket");
            return Ok(());
        }

        let stream = tokio::time::timeout(self.config.connect_timeout, UnixStream::connect(path))
            .await
            .map_err(|_| AdapterError::Timeout {
                operation: "connect",
                after: self.config.connect_timeout,
            })?
            .map_err(|e| AdapterError::Connect {
                path: path.clone(),
                source: e,
            })?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, self.config.max_frame_size);
        let mut writer = FrameWriter::new(write_half, self.config.max_frame_size);

        let reply = self.register_client(&mut reader, &mut writer).await?;
        let table: HashMap<String, u16> = reply
            .message_table
            .into_iter()
            .map(|entry| (entry.name, entry.index))
            .collect();
        info!(
            ?path,
            client_index = reply.index,
            messages = table.len(),
            "connected to VPP API socket"
        );
        self.client_index.store(reply.index, Ordering::SeqCst);
        *write_lock(&self.msg_table) = table;

        let handle = tokio::spawn(read_loop(reader, Arc::clone(&self.sink)));
        if let Some(previous) = lock(&self.reader).replace(handle) {
            previous.abort();
        }
        *writer_slot = Some(writer);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(err) = self.unregister_client(&mut writer).await {
                debug!(error = %err, "sockclnt_delete not sent");
            }
            if let Err(err) = writer.shutdown().await {
                debug!(error = %err, "socket shutdown failed");
            }
            info!(path = ?self.config.path, "disconnected from VPP API socket");
        }
        if let Some(handle) = lock(&self.reader).take() {
            handle.abort();
        }
        write_lock(&self.msg_table).clear();
        Ok(())
    }

    async fn wait_ready(&self) -> Result<()> {
        let path = &self.config.path;
        let deadline = Instant::now() + self.config.max_wait_ready;
        loop {
            if tokio::fs::metadata(path).await.is_ok() {
                debug!(?path, "VPP API socket present");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::Timeout {
                    operation: "VPP API socket",
                    after: self.config.max_wait_ready,
                });
            }
            tokio::time::sleep(WAIT_READY_POLL).await;
        }
    }

    async fn send_msg(&self, context: u32, data: Bytes) -> Result<()> {
        let msg = stamp_header(&data, self.client_index(), context);
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(AdapterError::NotConnected)?;
        writer.write_frame(&msg).await
    }

    fn set_frame_sink(&self, sink: FrameSink) {
        *lock(&self.sink) = Some(sink);
    }

    fn get_msg_id(&self, name: &str, crc: &str) -> Result<u16> {
        read_lock(&self.msg_table)
            .get(&format!("{name}_{crc}"))
            .copied()
            .ok_or_else(|| AdapterError::UnknownMessage {
                name: name.to_string(),
                crc: crc.to_string(),
            })
    }
}

/// Write the client index and context into a request header.
/// Messages too short to carry a request header are left untouched.
fn stamp_header(data: &[u8], client_index: u32, context: u32) -> BytesMut {
    let mut msg = BytesMut::from(data);
    if msg.len() >= MessageType::Request.header_len() {
        msg[2..6].copy_from_slice(&client_index.to_be_bytes());
        msg[6..10].copy_from_slice(&context.to_be_bytes());
    }
    msg
}

async fn read_loop(mut reader: FrameReader<OwnedReadHalf>, sink: Arc<Mutex<Option<FrameSink>>>) {
    loop {
        let data = match reader.read_frame().await {
            Ok(data) => data,
            Err(AdapterError::ConnectionClosed) => {
                debug!("VPP closed the API socket");
                return;
            }
            Err(err) => {
                warn!(error = %err, "reading from VPP API socket failed");
                return;
            }
        };

        let msg_id = match peek_msg_id(&data) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "dropping malformed message");
                continue;
            }
        };

        let current = lock(&sink).clone();
        match current {
            Some(sink) => {
                if !sink.push(RawFrame::new(msg_id, data)) {
                    debug!(msg_id, "frame sink closed; message dropped");
                }
            }
            None => warn!(msg_id, "no frame sink installed; message dropped"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
