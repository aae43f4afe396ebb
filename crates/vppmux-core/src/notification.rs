use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use vppmux_api::{Message, MessageInfo, MsgCodec};

use crate::connection::ConnectionInner;
use crate::error::{MuxError, Result};

enum Delivery {
    Delivered,
    Full,
    Closed,
}

type Deliver = Box<dyn Fn(&MsgCodec, &Bytes) -> Result<Delivery> + Send + Sync>;

/// A destination queue for one notification type.
pub(crate) struct Subscription {
    msg_id: u16,
    info: MessageInfo,
    deliver: Deliver,
}

impl Subscription {
    pub(crate) fn new<M, F>(
        msg_id: u16,
        sample: &M,
        queue: mpsc::Sender<M>,
        factory: F,
    ) -> Self
    where
        M: Message,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let deliver = move |codec: &MsgCodec, data: &Bytes| -> Result<Delivery> {
            let mut event = factory();
            codec.decode_msg(data, &mut event)?;
            Ok(match queue.try_send(event) {
                Ok(()) => Delivery::Delivered,
                Err(TrySendError::Full(_)) => Delivery::Full,
                Err(TrySendError::Closed(_)) => Delivery::Closed,
            })
        };
        Self {
            msg_id,
            info: MessageInfo::of(sample),
            deliver: Box::new(deliver),
        }
    }

    pub(crate) fn msg_id(&self) -> u16 {
        self.msg_id
    }
}

/// Handle for an active notification subscription.
pub struct SubscriptionCtx {
    conn: Arc<ConnectionInner>,
    subscription: Arc<Subscription>,
}

impl SubscriptionCtx {
    pub(crate) fn new(conn: Arc<ConnectionInner>, subscription: Arc<Subscription>) -> Self {
        Self { conn, subscription }
    }

    /// Message ID the subscription listens to.
    pub fn msg_id(&self) -> u16 {
        self.subscription.msg_id
    }

    /// Stop delivering notifications to this subscription's queue.
    pub fn unsubscribe(&self) -> Result<()> {
        if self.conn.is_closed() {
            return Err(MuxError::NotConnected);
        }
        debug!(
            msg_name = self.subscription.info.name,
            msg_id = self.subscription.msg_id,
            "removing notification subscription"
        );
        if self.conn.remove_subscription(&self.subscription) {
            Ok(())
        } else {
            Err(MuxError::SubscriptionNotFound(
                self.subscription.info.name.to_string(),
            ))
        }
    }
}

impl std::fmt::Debug for SubscriptionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionCtx")
            .field("msg_id", &self.subscription.msg_id)
            .field("msg_name", &self.subscription.info.name)
            .finish()
    }
}

/// Fan a notification out to every subscriber of `msg_id`.
///
/// Never blocks: subscribers whose queue is full miss the notification.
pub(crate) fn send_notifications(conn: &ConnectionInner, msg_id: u16, data: &Bytes) {
    let subscriptions = conn.subscriptions_for(msg_id);
    let mut matched = false;

    for sub in &subscriptions {
        let name = sub.info.name;
        match (sub.deliver)(&conn.codec, data) {
            Ok(Delivery::Delivered) => {
                debug!(msg_name = name, msg_id, msg_size = data.len(), "notification delivered");
            }
            Ok(Delivery::Full) => {
                warn!(
                    msg_name = name,
                    msg_id,
                    msg_size = data.len(),
                    "unable to deliver the notification, receiver end not ready"
                );
            }
            Ok(Delivery::Closed) => {
                debug!(msg_name = name, msg_id, "notification receiver dropped");
            }
            Err(err) => {
                error!(
                    msg_name = name,
                    msg_id,
                    msg_size = data.len(),
                    error = %err,
                    "unable to decode the notification message"
                );
                continue;
            }
        }
        matched = true;
    }

    if !matched {
        info!(
            msg_id,
            msg_size = data.len(),
            "no subscription found for the notification message"
        );
    }
}
