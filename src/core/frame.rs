//! Control-channel frame codec.
//!
//! Every message exchanged with a peer is a single JSON text frame carrying a
//! `type` discriminator and (for all frame kinds) a `requestId` correlating it
//! to one in-flight dispatch. Bodies travel base64-encoded so the frames
//! survive text transport unmodified.
//!
//! Decoding is deliberately forgiving at the connection level: a malformed or
//! unknown frame is reported to the caller, logged, and dropped. It never
//! terminates the peer connection; it can only affect the dispatch it would
//! have advanced.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque correlation token for one dispatch. Generated as a UUIDv4 string.
pub type RequestId = String;

/// Header map as carried on the wire: name → single value or value list.
pub type FrameHeaders = BTreeMap<String, FrameHeaderValue>;

/// A header value in a frame. Peers may send either a bare string or a list
/// for repeated headers; both shapes round-trip through serde untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameHeaderValue {
    Single(String),
    Multi(Vec<String>),
}

impl FrameHeaderValue {
    /// Iterate the individual values regardless of shape.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            FrameHeaderValue::Single(v) => std::slice::from_ref(v).iter().map(String::as_str),
            FrameHeaderValue::Multi(vs) => vs.as_slice().iter().map(String::as_str),
        }
    }
}

impl From<String> for FrameHeaderValue {
    fn from(value: String) -> Self {
        FrameHeaderValue::Single(value)
    }
}

/// How the peer should deliver the response for a forwarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// One `forwardedResponse` frame carrying the whole reply.
    Buffer,
    /// A `forwardedResponseStreamStart` followed by chunk frames.
    Stream,
}

/// The control-channel tagged union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlFrame {
    /// Gateway → peer: execute this HTTP request.
    #[serde(rename = "forwardedRequest")]
    ForwardedRequest {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Original path + query of the public request.
        url: String,
        method: String,
        headers: FrameHeaders,
        #[serde(rename = "body_b64")]
        body_b64: String,
        #[serde(rename = "responseMode")]
        response_mode: ResponseMode,
    },
    /// Peer → gateway: complete buffered reply.
    #[serde(rename = "forwardedResponse")]
    ForwardedResponse {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "statusCode")]
        status_code: u16,
        headers: FrameHeaders,
        #[serde(rename = "body_b64")]
        body_b64: String,
    },
    /// Peer → gateway: status and headers of a streamed reply.
    #[serde(rename = "forwardedResponseStreamStart")]
    StreamStart {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "statusCode")]
        status_code: u16,
        headers: FrameHeaders,
    },
    /// Peer → gateway: one chunk of a streamed reply. `isFinal` ends it.
    #[serde(rename = "forwardedResponseStreamChunk")]
    StreamChunk {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "body_b64")]
        body_b64: String,
        #[serde(rename = "isFinal", default)]
        is_final: bool,
    },
    /// Gateway → peer: abandon an in-flight streamed request.
    #[serde(rename = "cancelForwardedRequest")]
    Cancel {
        #[serde(rename = "requestId")]
        request_id: RequestId,
    },
}

impl ControlFrame {
    /// The dispatch this frame belongs to.
    pub fn request_id(&self) -> &str {
        match self {
            ControlFrame::ForwardedRequest { request_id, .. }
            | ControlFrame::ForwardedResponse { request_id, .. }
            | ControlFrame::StreamStart { request_id, .. }
            | ControlFrame::StreamChunk { request_id, .. }
            | ControlFrame::Cancel { request_id } => request_id,
        }
    }

    /// Wire name of the discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlFrame::ForwardedRequest { .. } => "forwardedRequest",
            ControlFrame::ForwardedResponse { .. } => "forwardedResponse",
            ControlFrame::StreamStart { .. } => "forwardedResponseStreamStart",
            ControlFrame::StreamChunk { .. } => "forwardedResponseStreamChunk",
            ControlFrame::Cancel { .. } => "cancelForwardedRequest",
        }
    }
}

const KNOWN_FRAME_TYPES: &[&str] = &[
    "forwardedRequest",
    "forwardedResponse",
    "forwardedResponseStreamStart",
    "forwardedResponseStreamChunk",
    "cancelForwardedRequest",
];

/// Why an inbound text message could not be turned into a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame is missing the type discriminator")]
    MissingType,
    #[error("unknown frame type {0:?}")]
    UnknownType(String),
}

/// Encode an outbound frame as a JSON text message.
pub fn encode(frame: &ControlFrame) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode an inbound text message.
///
/// Distinguishes unknown discriminators from malformed JSON so the connection
/// loop can log them differently; both are dropped without touching any
/// dispatch other than the one the frame addressed.
pub fn decode(text: &str) -> Result<ControlFrame, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(FrameError::MissingType)?;
    if !KNOWN_FRAME_TYPES.contains(&kind) {
        return Err(FrameError::UnknownType(kind.to_owned()));
    }
    Ok(serde_json::from_value(value)?)
}
