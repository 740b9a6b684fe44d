//! WebSocket control-channel endpoint.
//!
//! Peers connect here (outbound from the private network), present their
//! already-allocated hostname, and stay attached for the life of the tunnel.
//! The connection runs two halves: a single writer task draining the peer's
//! outbound queue into the socket, and the inbound loop decoding text frames
//! and routing them to dispatches. Frame-level failures are logged and
//! dropped; only transport errors end the connection.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::{HeaderMap, Response, StatusCode},
};
use futures_util::{SinkExt, StreamExt};
use tracing::Instrument;

use crate::{
    config::models::TunnelConfig,
    core::{
        frame::{self, FrameError},
        peer::Peer,
        registry::PeerRegistry,
    },
    metrics, tracing_setup,
    utils::host::normalize_hostname,
};

pub struct ControlSocket {
    registry: Arc<PeerRegistry>,
    config: TunnelConfig,
}

impl ControlSocket {
    pub fn new(registry: Arc<PeerRegistry>, config: TunnelConfig) -> Self {
        Self { registry, config }
    }

    /// Accept a peer connection. The hostname arrives in a request header;
    /// authenticating it and allocating it happened upstream of this process.
    pub async fn handle_upgrade(
        &self,
        upgrade: WebSocketUpgrade,
        headers: &HeaderMap,
        remote_addr: SocketAddr,
    ) -> Response<Body> {
        let presented = headers
            .get(self.config.hostname_header.as_str())
            .and_then(|value| value.to_str().ok());
        let hostname = match presented.map(normalize_hostname) {
            Some(Ok(hostname)) => hostname,
            _ => {
                tracing::warn!(
                    remote = %remote_addr,
                    header = %self.config.hostname_header,
                    "rejecting control connection without a usable hostname"
                );
                return Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from("missing or invalid tunnel hostname"))
                    .unwrap_or_else(|_| Response::new(Body::empty()));
            }
        };

        let registry = Arc::clone(&self.registry);
        let span = tracing_setup::create_peer_span(&hostname, &remote_addr.to_string());
        upgrade.on_upgrade(move |socket| {
            run_connection(registry, hostname, remote_addr, socket).instrument(span)
        })
    }
}

async fn run_connection(
    registry: Arc<PeerRegistry>,
    hostname: String,
    remote_addr: SocketAddr,
    socket: WebSocket,
) {
    let (peer, mut outbound_rx) = Peer::new(hostname.clone(), remote_addr.ip());
    registry.bind(&hostname, peer.clone()).await;
    metrics::set_peers_connected(registry.len());
    tracing::info!(hostname = %hostname, remote = %remote_addr, "peer connected");

    let (mut sink, mut stream) = socket.split();

    // Single-writer half: the only task that touches the transport's send
    // side, serializing frames from all concurrent dispatches.
    let writer_peer = peer.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe = outbound_rx.recv() => {
                    let Some(outgoing) = maybe else { break };
                    let text = match frame::encode(&outgoing) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to encode outbound frame");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = writer_peer.closed() => break,
            }
        }
    });

    // Inbound half: decode and route. Also watches for eviction, which closes
    // the peer out from under us while the socket is still up.
    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_text_frame(&peer, &text),
                    Some(Ok(Message::Binary(_))) => {
                        metrics::increment_frames_dropped("binary");
                        tracing::warn!(hostname = %hostname, "dropping unexpected binary message");
                    }
                    // Ping/pong are answered by the websocket layer.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(hostname = %hostname, error = %err, "control socket read error");
                        break;
                    }
                }
            }
            _ = peer.closed() => break,
        }
    }

    peer.close();
    registry.unbind(&hostname, &peer).await;
    metrics::set_peers_connected(registry.len());
    let _ = writer.await;
    tracing::info!(hostname = %hostname, remote = %remote_addr, "peer disconnected");
}

/// Decode one text message and hand it to the peer's frame router. Malformed
/// and unknown frames are dropped here; they never end the connection.
fn handle_text_frame(peer: &Arc<Peer>, text: &str) {
    match frame::decode(text) {
        Ok(incoming) => peer.deliver(incoming),
        Err(err @ FrameError::UnknownType(_)) => {
            metrics::increment_frames_dropped("unknown_type");
            tracing::warn!(hostname = %peer.hostname(), error = %err, "dropping frame");
        }
        Err(err) => {
            metrics::increment_frames_dropped("malformed");
            tracing::warn!(hostname = %peer.hostname(), error = %err, "dropping malformed frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::ControlFrame;

    #[tokio::test]
    async fn malformed_frames_do_not_disturb_dispatches() {
        let (peer, _outbound) = Peer::new("a.example".into(), "10.0.0.1".parse().unwrap());
        let mut sub = peer.subscribe("req-1".into());

        handle_text_frame(&peer, "{not json");
        handle_text_frame(&peer, r#"{"type":"mystery","requestId":"req-1"}"#);
        handle_text_frame(
            &peer,
            r#"{"type":"cancelForwardedRequest","requestId":"req-1"}"#,
        );

        // Only the well-formed frame arrives.
        assert_eq!(
            sub.next().await,
            Some(ControlFrame::Cancel {
                request_id: "req-1".into()
            })
        );
        assert!(!peer.is_closed());
    }
}
