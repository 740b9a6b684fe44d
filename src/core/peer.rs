//! One connected peer: the private service that owns a hostname.
//!
//! A `Peer` wraps the duplex control channel established *from* the private
//! side. Outbound frames funnel through a bounded mpsc queue drained by a
//! single writer task, so concurrent dispatches never interleave writes on
//! the underlying transport. Inbound frames are routed by request id through
//! a handler map. Each active dispatch registers exactly one mailbox, so
//! delivery is an O(1) lookup instead of a broadcast every subscriber has to
//! filter.
use std::{net::IpAddr, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::core::frame::{ControlFrame, RequestId};

/// Outbound frames queued ahead of the transport writer.
const OUTBOUND_QUEUE: usize = 64;

/// Channel-level failures surfaced to dispatches.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The control channel is shut; no further frames can be written.
    #[error("control channel closed")]
    ChannelClosed,
    /// The outbound queue is saturated (best-effort sends only).
    #[error("outbound queue full")]
    QueueFull,
}

/// A live control-channel connection to one private service.
pub struct Peer {
    hostname: String,
    remote_ip: IpAddr,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<ControlFrame>,
    handlers: scc::HashMap<RequestId, mpsc::UnboundedSender<ControlFrame>>,
    closed: watch::Sender<bool>,
}

impl Peer {
    /// Create a peer plus the receiving end of its outbound queue. The caller
    /// owns the transport: it drains the returned receiver into the socket
    /// (the single-writer side) and feeds inbound frames to [`Peer::deliver`].
    pub fn new(hostname: String, remote_ip: IpAddr) -> (Arc<Self>, mpsc::Receiver<ControlFrame>) {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (closed, _) = watch::channel(false);
        let peer = Arc::new(Self {
            hostname,
            remote_ip,
            connected_at: Utc::now(),
            outbound,
            handlers: scc::HashMap::new(),
            closed,
        });
        (peer, outbound_rx)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Stable observed address of the peer side of the control channel.
    pub fn remote_ip(&self) -> IpAddr {
        self.remote_ip
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the channel shuts (close call or eviction).
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Queue a frame for the writer task. Fails once the channel is shut.
    pub async fn send(&self, frame: ControlFrame) -> Result<(), PeerError> {
        if self.is_closed() {
            return Err(PeerError::ChannelClosed);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| PeerError::ChannelClosed)
    }

    /// Best-effort synchronous send, used from drop paths (cancellation)
    /// where awaiting is not an option.
    pub fn try_send(&self, frame: ControlFrame) -> Result<(), PeerError> {
        if self.is_closed() {
            return Err(PeerError::ChannelClosed);
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PeerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PeerError::ChannelClosed,
        })
    }

    /// Register a mailbox for one request id. The subscription unregisters
    /// itself on drop. Subscribing against a closed peer yields a mailbox
    /// that reports the peer as gone on the first receive.
    pub fn subscribe(self: &Arc<Self>, request_id: RequestId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_closed() {
            let _ = self.handlers.insert(request_id.clone(), tx);
        }
        Subscription {
            peer: Arc::clone(self),
            request_id,
            rx,
        }
    }

    /// Route one inbound frame to the dispatch that owns its request id.
    /// Frames for unknown ids (dispatch already terminated, or never existed)
    /// are dropped.
    pub fn deliver(&self, frame: ControlFrame) {
        let delivered = self
            .handlers
            .read(frame.request_id(), |_, tx| tx.send(frame.clone()).is_ok())
            .unwrap_or(false);
        if !delivered {
            tracing::trace!(
                hostname = %self.hostname,
                request_id = %frame.request_id(),
                kind = frame.kind(),
                "dropping frame with no active dispatch"
            );
        }
    }

    /// Shut the channel: all subscribers observe closure, further sends fail.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        tracing::debug!(hostname = %self.hostname, "peer connection closed");
        self.handlers.clear();
    }

    /// Number of registered dispatch mailboxes (diagnostics and tests).
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// A dispatch's registered mailbox on a peer. Dropping it unregisters the
/// handler, so a terminated dispatch stops seeing frames immediately.
pub struct Subscription {
    peer: Arc<Peer>,
    request_id: RequestId,
    rx: mpsc::UnboundedReceiver<ControlFrame>,
}

impl Subscription {
    /// Next frame for this request id, or `None` once the peer is gone.
    pub async fn next(&mut self) -> Option<ControlFrame> {
        self.rx.recv().await
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.peer.handlers.remove(&self.request_id);
    }
}
