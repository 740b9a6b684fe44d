//! Per-request dispatch state machine.
//!
//! A dispatch owns one public HTTP exchange end to end: it issues a
//! `forwardedRequest` frame to the peer, correlates response frames by
//! request id, drives the public HTTP reply (buffered or chunk-streamed),
//! enforces the buffered deadline, and propagates client cancellation.
//!
//! Suspension points (the next matching frame, the outbound send, the client
//! abort, the deadline) are race-composed with `select!` and RAII drop
//! guards, so whichever fires first wins and the rest are torn down with the
//! dispatch. Client aborts surface as the response future (and therefore the
//! subscription and guard) being dropped.
use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use base64::prelude::{BASE64_STANDARD, Engine as _};
use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::models::DispatchConfig,
    core::{
        frame::{ControlFrame, FrameHeaders, RequestId, ResponseMode},
        headers,
        peer::Peer,
        recorder::Recorder,
    },
    metrics,
    ports::log_store::{NewRequestLog, STREAMED_BODY_SENTINEL},
};

/// Terminal failures of one dispatch. Never surfaced to other dispatches.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The peer's control channel closed while the dispatch was in flight.
    #[error("peer disconnected mid-flight")]
    PeerGone,
    /// The outbound frame was rejected by the control channel.
    #[error("failed to write frame to peer")]
    SendFailure,
    /// A buffered dispatch saw no response frame before its deadline.
    #[error("buffered dispatch deadline exceeded")]
    Timeout,
    /// The response frame carried an undecodable body.
    #[error("peer response could not be decoded: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl DispatchError {
    /// HTTP status emitted when the failure happens before any headers were
    /// written to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::PeerGone | DispatchError::SendFailure | DispatchError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

/// Everything the dispatcher needs from the inbound public request.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub hostname: String,
    pub method: String,
    /// Original path + query.
    pub target: String,
    /// Canonicalized (title-cased) request headers.
    pub headers: FrameHeaders,
    pub body: Bytes,
}

/// A complete buffered reply, headers already sanitized and
/// `X-Forwarded-For` injected.
#[derive(Debug)]
pub struct BufferedReply {
    pub status: u16,
    pub headers: FrameHeaders,
    pub body: Vec<u8>,
}

/// Drives dispatches against peers and records completed exchanges.
pub struct Dispatcher {
    recorder: Recorder,
    buffered_timeout: Duration,
}

impl Dispatcher {
    pub fn new(recorder: Recorder, config: &DispatchConfig) -> Self {
        Self {
            recorder,
            buffered_timeout: Duration::from_secs(config.buffered_timeout_secs),
        }
    }

    /// Forward a public request through `peer` and produce the HTTP response,
    /// recording the exchange when a peer-derived response was delivered.
    pub async fn dispatch(
        &self,
        peer: &Arc<Peer>,
        request: DispatchRequest,
        mode: ResponseMode,
    ) -> Response<Body> {
        let timer = metrics::DispatchTimer::start(&request.hostname, mode);
        match mode {
            ResponseMode::Buffer => {
                match self
                    .forward_buffered(peer, &request, self.buffered_timeout)
                    .await
                {
                    Ok(reply) => {
                        timer.finish(reply.status);
                        self.recorder.record(capture_exchange(
                            &request,
                            reply.status,
                            &reply.headers,
                            BASE64_STANDARD.encode(&reply.body),
                        ));
                        buffered_response(reply)
                    }
                    Err(err) => {
                        timer.finish(err.status().as_u16());
                        error_response(&err, &request)
                    }
                }
            }
            ResponseMode::Stream => match self.forward_streaming(peer, &request).await {
                Ok(response) => {
                    timer.finish(response.status().as_u16());
                    response
                }
                Err(err) => {
                    timer.finish(err.status().as_u16());
                    error_response(&err, &request)
                }
            },
        }
    }

    /// Buffered mode: one `forwardedResponse` frame carries the whole reply.
    ///
    /// Also the replay path, which supplies its own (shorter) deadline.
    pub async fn forward_buffered(
        &self,
        peer: &Arc<Peer>,
        request: &DispatchRequest,
        deadline: Duration,
    ) -> Result<BufferedReply, DispatchError> {
        let request_id = new_request_id();
        // Subscribe before sending so the response frame cannot race past us.
        let mut sub = peer.subscribe(request_id.clone());
        send_forwarded_request(peer, &request_id, request, ResponseMode::Buffer).await?;

        let expiry = tokio::time::sleep(deadline);
        tokio::pin!(expiry);
        loop {
            tokio::select! {
                _ = &mut expiry => {
                    tracing::warn!(
                        request_id = %request_id,
                        hostname = %request.hostname,
                        "buffered dispatch deadline exceeded"
                    );
                    return Err(DispatchError::Timeout);
                }
                frame = sub.next() => match frame {
                    None => return Err(DispatchError::PeerGone),
                    Some(ControlFrame::ForwardedResponse { status_code, headers, body_b64, .. }) => {
                        let body = BASE64_STANDARD.decode(body_b64.as_bytes())?;
                        let mut sanitized = headers::sanitize(&headers, Some(body.len()));
                        headers::inject_forwarded_for(
                            &mut sanitized,
                            &peer.remote_ip().to_string(),
                        );
                        return Ok(BufferedReply { status: status_code, headers: sanitized, body });
                    }
                    Some(other) => {
                        // Stream frames have no business in a buffered dispatch.
                        tracing::debug!(
                            request_id = %request_id,
                            kind = other.kind(),
                            "ignoring unexpected frame in buffered dispatch"
                        );
                    }
                }
            }
        }
    }

    /// Stream mode: a `Start` frame carries status and headers, chunk frames
    /// carry the body incrementally until one is marked final.
    ///
    /// No gateway-enforced total deadline: the dispatch ends on `isFinal`,
    /// client close, or peer loss.
    pub async fn forward_streaming(
        &self,
        peer: &Arc<Peer>,
        request: &DispatchRequest,
    ) -> Result<Response<Body>, DispatchError> {
        let request_id = new_request_id();
        let mut sub = peer.subscribe(request_id.clone());
        send_forwarded_request(peer, &request_id, request, ResponseMode::Stream).await?;

        let (status_code, raw_headers) = loop {
            match sub.next().await {
                None => return Err(DispatchError::PeerGone),
                Some(ControlFrame::StreamStart { status_code, headers, .. }) => {
                    break (status_code, headers);
                }
                Some(other) => {
                    // Chunks ahead of the start frame are dropped, as is a
                    // buffered response frame in stream mode.
                    tracing::debug!(
                        request_id = %request_id,
                        kind = other.kind(),
                        "dropping frame ahead of stream start"
                    );
                }
            }
        };

        let mut sanitized = headers::sanitize(&raw_headers, None);
        headers::inject_forwarded_for(&mut sanitized, &peer.remote_ip().to_string());
        let header_map = headers::to_header_map(&sanitized);

        let mut guard = StreamGuard {
            peer: Arc::clone(peer),
            request_id: request_id.clone(),
            recorder: self.recorder.clone(),
            capture: Some(capture_exchange(
                request,
                status_code,
                &sanitized,
                STREAMED_BODY_SENTINEL.to_string(),
            )),
            completed: false,
        };

        let body_stream = async_stream::stream! {
            loop {
                match sub.next().await {
                    // Peer loss after headers were sent: end the response.
                    None => {
                        guard.finish();
                        break;
                    }
                    Some(ControlFrame::StreamChunk { body_b64, is_final, .. }) => {
                        match BASE64_STANDARD.decode(body_b64.as_bytes()) {
                            Ok(bytes) => {
                                if !bytes.is_empty() {
                                    yield Ok::<Bytes, Infallible>(Bytes::from(bytes));
                                }
                            }
                            Err(err) => {
                                tracing::warn!(
                                    request_id = %guard.request_id,
                                    error = %err,
                                    "undecodable stream chunk, ending response"
                                );
                                guard.finish();
                                break;
                            }
                        }
                        if is_final {
                            guard.finish();
                            break;
                        }
                    }
                    Some(ControlFrame::StreamStart { .. }) => {
                        tracing::debug!(
                            request_id = %guard.request_id,
                            "dropping duplicate stream start"
                        );
                    }
                    Some(other) => {
                        tracing::debug!(
                            request_id = %guard.request_id,
                            kind = other.kind(),
                            "dropping unexpected frame in streamed dispatch"
                        );
                    }
                }
            }
        };

        let mut response = Response::builder()
            .status(StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_GATEWAY))
            .body(Body::from_stream(body_stream))
            .unwrap_or_else(|_| Response::new(Body::empty()));
        *response.headers_mut() = header_map;
        Ok(response)
    }
}

/// Terminates an in-flight stream when the body future is dropped before the
/// final chunk: tells the peer to stop working and records the partial
/// exchange exactly once.
struct StreamGuard {
    peer: Arc<Peer>,
    request_id: RequestId,
    recorder: Recorder,
    capture: Option<NewRequestLog>,
    completed: bool,
}

impl StreamGuard {
    fn finish(&mut self) {
        self.completed = true;
        if let Some(capture) = self.capture.take() {
            self.recorder.record(capture);
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        tracing::debug!(
            request_id = %self.request_id,
            "client aborted streamed dispatch, cancelling on peer"
        );
        if let Err(err) = self.peer.try_send(ControlFrame::Cancel {
            request_id: self.request_id.clone(),
        }) {
            tracing::debug!(request_id = %self.request_id, error = %err, "cancel frame not sent");
        }
        if let Some(capture) = self.capture.take() {
            self.recorder.record(capture);
        }
    }
}

fn new_request_id() -> RequestId {
    Uuid::new_v4().to_string()
}

async fn send_forwarded_request(
    peer: &Arc<Peer>,
    request_id: &str,
    request: &DispatchRequest,
    mode: ResponseMode,
) -> Result<(), DispatchError> {
    let frame = ControlFrame::ForwardedRequest {
        request_id: request_id.to_string(),
        url: request.target.clone(),
        method: request.method.clone(),
        headers: request.headers.clone(),
        body_b64: if request.body.is_empty() {
            String::new()
        } else {
            BASE64_STANDARD.encode(&request.body)
        },
        response_mode: mode,
    };
    peer.send(frame).await.map_err(|err| {
        tracing::warn!(
            request_id,
            hostname = %request.hostname,
            error = %err,
            "failed to issue forwarded request"
        );
        DispatchError::SendFailure
    })
}

fn headers_json(headers: &FrameHeaders) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string())
}

/// Build the capture row for one finished exchange (also used by replay).
pub(crate) fn capture_exchange(
    request: &DispatchRequest,
    status: u16,
    response_headers: &FrameHeaders,
    response_body: String,
) -> NewRequestLog {
    NewRequestLog {
        hostname: request.hostname.clone(),
        path: request.target.clone(),
        method: request.method.clone(),
        request_headers: headers_json(&request.headers),
        request_body: BASE64_STANDARD.encode(&request.body),
        response_status: Some(status),
        response_headers: headers_json(response_headers),
        response_body,
        created_at: Utc::now(),
    }
}

fn buffered_response(reply: BufferedReply) -> Response<Body> {
    let header_map = headers::to_header_map(&reply.headers);
    let mut response = Response::builder()
        .status(StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY))
        .body(Body::from(reply.body))
        .unwrap_or_else(|_| Response::new(Body::empty()));
    *response.headers_mut() = header_map;
    response
}

fn error_response(err: &DispatchError, request: &DispatchRequest) -> Response<Body> {
    let status = err.status();
    tracing::warn!(
        hostname = %request.hostname,
        method = %request.method,
        target = %request.target,
        error = %err,
        "dispatch failed"
    );
    Response::builder()
        .status(status)
        .body(Body::from(format!("{err}")))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
