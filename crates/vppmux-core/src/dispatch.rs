//! Background tasks moving frames between channels and the adapter.
//!
//! One dispatcher per connection routes inbound frames to channel reply
//! queues or notification subscribers. One request task per channel encodes
//! queued requests and hands them to the adapter in queue order.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, error, trace, warn};
use vppmux_adapter::RawFrame;
use vppmux_api::ControlPing;

use crate::channel::{VppReply, VppRequest};
use crate::connection::ConnectionInner;
use crate::context::{pack_request_context, unpack_request_context};
use crate::error::{MuxError, Result};
use crate::notification::send_notifications;

/// Route inbound frames until the connection is dropped or shut down.
pub(crate) async fn run_dispatcher(
    conn: Weak<ConnectionInner>,
    mut frames: mpsc::UnboundedReceiver<RawFrame>,
) {
    let Some(shutdown) = conn.upgrade().map(|c| c.shutdown.clone()) else {
        return;
    };

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let Some(conn) = conn.upgrade() else {
            break;
        };
        route_frame(&conn, frame).await;
    }
    debug!("reply dispatcher stopped");
}

async fn route_frame(conn: &ConnectionInner, frame: RawFrame) {
    let RawFrame { msg_id, data } = frame;

    let info = match conn.lookup_by_id(msg_id) {
        Ok(info) => info,
        Err(_) => {
            warn!(msg_id, msg_size = data.len(), "received message with unknown ID, ignoring");
            return;
        }
    };

    let context = match conn.codec.decode_msg_context(&data, info.kind) {
        Ok(context) => context,
        Err(err) => {
            error!(msg_id, msg_name = info.name, error = %err, "failed to decode message context");
            0
        }
    };

    if context == 0 || conn.is_notification(msg_id) {
        send_notifications(conn, msg_id, &data);
        return;
    }

    let (channel_id, multipart, seq_num) = unpack_request_context(context);
    let Some(reply_tx) = conn.reply_sender(channel_id) else {
        error!(
            channel = channel_id,
            msg_id,
            msg_name = info.name,
            "received reply for an unknown channel, ignoring"
        );
        return;
    };

    let last_of_multipart = multipart && msg_id == conn.ping_reply_id();
    trace!(
        channel = channel_id,
        msg_id,
        msg_name = info.name,
        seq_num,
        multipart,
        last_of_multipart,
        "routing reply"
    );

    send_reply(
        conn,
        channel_id,
        &reply_tx,
        VppReply {
            seq_num,
            msg_id,
            data,
            last_of_multipart,
            error: None,
        },
    )
    .await;
    conn.record_reply();
}

/// Push a reply into a channel's queue, giving a full queue a short grace
/// period before the reply is dropped.
async fn send_reply(
    conn: &ConnectionInner,
    channel_id: u16,
    reply_tx: &mpsc::Sender<VppReply>,
    reply: VppReply,
) {
    let grace = conn.config.reply_send_grace;
    match reply_tx.send_timeout(reply, grace).await {
        Ok(()) => {}
        Err(SendTimeoutError::Timeout(reply)) => {
            warn!(
                channel = channel_id,
                msg_id = reply.msg_id,
                seq_num = reply.seq_num,
                "unable to deliver reply, receiver end not ready"
            );
        }
        Err(SendTimeoutError::Closed(_)) => {
            debug!(channel = channel_id, "reply queue closed, dropping reply");
        }
    }
}

/// Serve one channel's request queue until the channel or the connection
/// closes, then release the channel ID.
pub(crate) async fn watch_requests(
    conn: Arc<ConnectionInner>,
    channel_id: u16,
    mut requests: mpsc::Receiver<VppRequest>,
    reply_tx: mpsc::Sender<VppReply>,
) {
    loop {
        let request = tokio::select! {
            _ = conn.shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        if let Err(err) = process_request(&conn, channel_id, &request).await {
            debug!(
                channel = channel_id,
                seq_num = request.seq_num,
                msg_name = request.msg.name(),
                error = %err,
                "request failed"
            );
            send_reply(&conn, channel_id, &reply_tx, VppReply::error(request.seq_num, err)).await;
        }
    }

    conn.release_channel(channel_id);
}

async fn process_request(
    conn: &ConnectionInner,
    channel_id: u16,
    request: &VppRequest,
) -> Result<()> {
    if !conn.is_connected() {
        return Err(MuxError::NotConnected);
    }

    let msg = request.msg.as_ref();
    let msg_id = conn.message_id(msg)?;
    let context = pack_request_context(channel_id, request.multipart, request.seq_num);
    let data = conn.codec.encode_msg_with_context(msg, msg_id, context)?;

    debug!(
        channel = channel_id,
        msg_id,
        msg_name = msg.name(),
        seq_num = request.seq_num,
        multipart = request.multipart,
        msg_size = data.len(),
        "sending request"
    );
    conn.adapter.send_msg(context, data).await?;

    if request.multipart {
        // The ping reply terminates the multipart stream.
        let ping = conn
            .codec
            .encode_msg_with_context(&ControlPing, conn.ping_request_id(), context)?;
        if let Err(err) = conn.adapter.send_msg(context, ping).await {
            warn!(channel = channel_id, error = %err, "failed to send control ping");
        }
    }
    Ok(())
}
