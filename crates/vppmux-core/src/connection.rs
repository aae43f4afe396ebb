use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vppmux_adapter::{FrameSink, VppAdapter};
use vppmux_api::{Message, MessageInfo, MessageRegistry, MsgCodec, CONTROL_PING, CONTROL_PING_REPLY};

use crate::channel::{Channel, VppReply};
use crate::config::MuxConfig;
use crate::context::MAX_CHANNEL_ID;
use crate::dispatch;
use crate::error::{MuxError, Result};
use crate::health::{self, ConnectionEvent};
use crate::notification::Subscription;

/// Routing entry of an open channel.
pub(crate) struct ChannelEntry {
    pub(crate) reply_tx: mpsc::Sender<VppReply>,
}

#[derive(Default)]
struct MessageIds {
    by_name: HashMap<(&'static str, &'static str), u16>,
    by_id: HashMap<u16, MessageInfo>,
    ping_request_id: u16,
    ping_reply_id: u16,
}

/// State shared by a connection, its channels and its background tasks.
pub(crate) struct ConnectionInner {
    pub(crate) adapter: Arc<dyn VppAdapter>,
    pub(crate) codec: MsgCodec,
    pub(crate) config: MuxConfig,
    pub(crate) runtime: Handle,
    pub(crate) shutdown: CancellationToken,
    registry: MessageRegistry,
    /// The adapter link is up and message IDs are resolved.
    connected: AtomicBool,
    /// `Connection::disconnect` was called.
    closed: AtomicBool,
    ids: RwLock<MessageIds>,
    next_channel_id: AtomicU32,
    channels: RwLock<HashMap<u16, ChannelEntry>>,
    subscriptions: RwLock<HashMap<u16, Vec<Arc<Subscription>>>>,
    last_reply: Mutex<Option<Instant>>,
}

impl ConnectionInner {
    /// Build the shared state, install the frame sink and start the
    /// dispatcher. Does not connect.
    fn start(
        adapter: Arc<dyn VppAdapter>,
        registry: MessageRegistry,
        config: MuxConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| MuxError::NoRuntime)?;

        let inner = Arc::new(Self {
            adapter,
            codec: MsgCodec::new(),
            config,
            runtime,
            shutdown: CancellationToken::new(),
            registry,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            ids: RwLock::new(MessageIds::default()),
            next_channel_id: AtomicU32::new(0),
            channels: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            last_reply: Mutex::new(None),
        });

        let (sink, frames) = FrameSink::channel();
        inner.adapter.set_frame_sink(sink);
        inner
            .runtime
            .spawn(dispatch::run_dispatcher(Arc::downgrade(&inner), frames));
        Ok(inner)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connect the adapter and resolve every registered message.
    ///
    /// If any message cannot be resolved the adapter is disconnected again
    /// and `Incompatible` is returned.
    pub(crate) async fn connect_vpp(&self) -> Result<()> {
        self.adapter.connect().await?;

        if let Err(err) = self.resolve_message_ids() {
            error!(error = %err, "VPP is not compatible with the registered messages");
            if let Err(disconnect_err) = self.adapter.disconnect().await {
                debug!(error = %disconnect_err, "adapter disconnect failed");
            }
            return Err(err);
        }

        self.connected.store(true, Ordering::SeqCst);
        info!(messages = self.registry.len(), "connected to VPP");
        Ok(())
    }

    /// Disconnect the adapter if it is connected.
    pub(crate) async fn disconnect_vpp(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Err(err) = self.adapter.disconnect().await {
                warn!(error = %err, "adapter disconnect failed");
            }
            info!("disconnected from VPP");
        }
    }

    fn resolve_message_ids(&self) -> Result<()> {
        let mut ids = MessageIds::default();
        for info in self.registry.iter() {
            let id = self
                .adapter
                .get_msg_id(info.name, info.crc)
                .map_err(|err| MuxError::Incompatible(format!("message {info}: {err}")))?;
            match info.name {
                CONTROL_PING => ids.ping_request_id = id,
                CONTROL_PING_REPLY => ids.ping_reply_id = id,
                _ => {}
            }
            ids.by_name.insert((info.name, info.crc), id);
            ids.by_id.insert(id, *info);
        }
        debug!(count = ids.by_id.len(), "resolved message IDs");
        *write_lock(&self.ids) = ids;
        Ok(())
    }

    /// ID of `msg` on the current link. Messages outside the registry are
    /// resolved on first use and cached.
    pub(crate) fn message_id(&self, msg: &dyn Message) -> Result<u16> {
        if let Some(id) = read_lock(&self.ids).by_name.get(&(msg.name(), msg.crc())) {
            return Ok(*id);
        }
        if !self.is_connected() {
            return Err(MuxError::NotConnected);
        }

        let id = self
            .adapter
            .get_msg_id(msg.name(), msg.crc())
            .map_err(|_| MuxError::UnknownMessage {
                name: msg.name().to_string(),
                crc: msg.crc().to_string(),
            })?;
        let mut ids = write_lock(&self.ids);
        ids.by_name.insert((msg.name(), msg.crc()), id);
        ids.by_id.insert(id, MessageInfo::of(msg));
        Ok(id)
    }

    pub(crate) fn lookup_by_id(&self, msg_id: u16) -> Result<MessageInfo> {
        read_lock(&self.ids)
            .by_id
            .get(&msg_id)
            .copied()
            .ok_or(MuxError::UnknownMessageId(msg_id))
    }

    pub(crate) fn ping_request_id(&self) -> u16 {
        read_lock(&self.ids).ping_request_id
    }

    pub(crate) fn ping_reply_id(&self) -> u16 {
        read_lock(&self.ids).ping_reply_id
    }

    /// Open a channel with explicit queue capacities and start its task.
    pub(crate) fn open_channel(
        self: &Arc<Self>,
        request_queue_size: usize,
        reply_queue_size: usize,
    ) -> Result<Channel> {
        if self.is_closed() {
            return Err(MuxError::NotConnected);
        }
        if request_queue_size == 0 || reply_queue_size == 0 {
            return Err(MuxError::Config(
                "channel queue sizes must be greater than zero".to_string(),
            ));
        }

        let (req_tx, req_rx) = mpsc::channel(request_queue_size);
        let (reply_tx, reply_rx) = mpsc::channel(reply_queue_size);
        let id = self.allocate_channel(reply_tx.clone())?;

        self.runtime.spawn(dispatch::watch_requests(
            Arc::clone(self),
            id,
            req_rx,
            reply_tx,
        ));
        debug!(channel = id, "API channel opened");

        Ok(Channel::new(
            id,
            Arc::clone(self),
            req_tx,
            reply_rx,
            self.config.reply_timeout,
        ))
    }

    /// Reserve the next free channel ID. IDs wrap at 2^15 and skip 0.
    fn allocate_channel(&self, reply_tx: mpsc::Sender<VppReply>) -> Result<u16> {
        let mut channels = write_lock(&self.channels);
        for _ in 0..=MAX_CHANNEL_ID {
            let candidate = self.next_channel_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
            let id = (candidate & u32::from(MAX_CHANNEL_ID)) as u16;
            if id == 0 || channels.contains_key(&id) {
                continue;
            }
            channels.insert(id, ChannelEntry { reply_tx });
            return Ok(id);
        }
        Err(MuxError::ChannelsExhausted)
    }

    pub(crate) fn release_channel(&self, channel_id: u16) {
        if write_lock(&self.channels).remove(&channel_id).is_some() {
            debug!(channel = channel_id, "API channel released");
        }
    }

    pub(crate) fn reply_sender(&self, channel_id: u16) -> Option<mpsc::Sender<VppReply>> {
        read_lock(&self.channels)
            .get(&channel_id)
            .map(|entry| entry.reply_tx.clone())
    }

    pub(crate) fn add_subscription(&self, subscription: Arc<Subscription>) {
        write_lock(&self.subscriptions)
            .entry(subscription.msg_id())
            .or_default()
            .push(subscription);
    }

    /// Remove one subscription. Empty lists are dropped so the message ID
    /// stops being routed as a notification.
    pub(crate) fn remove_subscription(&self, subscription: &Arc<Subscription>) -> bool {
        let mut subscriptions = write_lock(&self.subscriptions);
        let msg_id = subscription.msg_id();
        let Some(list) = subscriptions.get_mut(&msg_id) else {
            return false;
        };
        let Some(index) = list.iter().position(|s| Arc::ptr_eq(s, subscription)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            subscriptions.remove(&msg_id);
        }
        true
    }

    pub(crate) fn is_notification(&self, msg_id: u16) -> bool {
        read_lock(&self.subscriptions).contains_key(&msg_id)
    }

    pub(crate) fn subscriptions_for(&self, msg_id: u16) -> Vec<Arc<Subscription>> {
        read_lock(&self.subscriptions)
            .get(&msg_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn record_reply(&self) {
        *lock(&self.last_reply) = Some(Instant::now());
    }

    /// Time since any channel last received a reply.
    pub(crate) fn since_last_reply(&self) -> Option<Duration> {
        lock(&self.last_reply).map(|at| at.elapsed())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.disconnect_vpp().await;
        write_lock(&self.channels).clear();
        write_lock(&self.subscriptions).clear();
        debug!("connection closed");
    }
}

/// A multiplexed connection to VPP.
///
/// Cloning is cheap; all clones share one link. Call
/// [`Connection::disconnect`] to release it.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Connect once and resolve all registered messages.
    ///
    /// Fails with the adapter's error if the link cannot be established, or
    /// with `Incompatible` if VPP does not know a registered message.
    pub async fn connect(
        adapter: Arc<dyn VppAdapter>,
        registry: MessageRegistry,
        config: MuxConfig,
    ) -> Result<Self> {
        let inner = ConnectionInner::start(adapter, registry, config)?;
        if let Err(err) = inner.connect_vpp().await {
            inner.closed.store(true, Ordering::SeqCst);
            inner.shutdown.cancel();
            return Err(err);
        }
        Ok(Self { inner })
    }

    /// Return immediately and connect in the background.
    ///
    /// The returned queue reports every transition between connected and
    /// disconnected. A background task keeps reconnecting and health
    /// checking the link until [`Connection::disconnect`] is called.
    pub fn async_connect(
        adapter: Arc<dyn VppAdapter>,
        registry: MessageRegistry,
        config: MuxConfig,
    ) -> Result<(Self, mpsc::Receiver<ConnectionEvent>)> {
        let inner = ConnectionInner::start(adapter, registry, config)?;
        let (events_tx, events_rx) = mpsc::channel(inner.config.event_queue_size);
        inner
            .runtime
            .spawn(health::connect_loop(Arc::clone(&inner), events_tx));
        Ok((Self { inner }, events_rx))
    }

    /// Open a channel with the configured queue sizes.
    pub fn new_api_channel(&self) -> Result<Channel> {
        self.new_api_channel_buffered(
            self.inner.config.request_queue_size,
            self.inner.config.reply_queue_size,
        )
    }

    /// Open a channel with explicit request and reply queue sizes.
    pub fn new_api_channel_buffered(
        &self,
        request_queue_size: usize,
        reply_queue_size: usize,
    ) -> Result<Channel> {
        self.inner
            .open_channel(request_queue_size, reply_queue_size)
    }

    /// Disconnect from VPP and stop all background tasks.
    ///
    /// Channels obtained from this connection fail with `NotConnected`
    /// afterwards. Safe to call more than once.
    pub async fn disconnect(&self) {
        self.inner.close().await;
    }

    /// ID of `msg` on the current link.
    pub fn message_id(&self, msg: &dyn Message) -> Result<u16> {
        self.inner.message_id(msg)
    }

    /// Identity of the message with the given ID on the current link.
    pub fn lookup_by_id(&self, msg_id: u16) -> Result<MessageInfo> {
        self.inner.lookup_by_id(msg_id)
    }

    /// Whether the link to VPP is currently up.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn config(&self) -> &MuxConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.inner.is_connected())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

/// Connect once. See [`Connection::connect`].
pub async fn connect(
    adapter: Arc<dyn VppAdapter>,
    registry: MessageRegistry,
    config: MuxConfig,
) -> Result<Connection> {
    Connection::connect(adapter, registry, config).await
}

/// Connect in the background. See [`Connection::async_connect`].
pub fn async_connect(
    adapter: Arc<dyn VppAdapter>,
    registry: MessageRegistry,
    config: MuxConfig,
) -> Result<(Connection, mpsc::Receiver<ConnectionEvent>)> {
    Connection::async_connect(adapter, registry, config)
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
