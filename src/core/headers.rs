//! Header-name canonicalization and response-header sanitization.
//!
//! Frames and persisted logs carry header names in title-case
//! (`Content-Type`), matching what peers expect to replay against their local
//! HTTP stack. Responses written back to the public client go through
//! [`sanitize`], which strips hop-by-hop fields and recomputes framing.
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

use crate::core::frame::{FrameHeaderValue, FrameHeaders};

/// Re-case a header name segment-wise to title-case: `x-forwarded-for` →
/// `X-Forwarded-For`.
pub fn titlecase(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Convert an inbound [`HeaderMap`] to the wire shape, title-casing names and
/// folding repeated headers into value lists. Values that are not valid UTF-8
/// are skipped; they cannot be represented in a JSON text frame.
pub fn canonicalize(headers: &HeaderMap) -> FrameHeaders {
    let mut out = FrameHeaders::new();
    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect();
        if values.is_empty() {
            tracing::warn!(header = %name, "dropping non-UTF-8 header value");
            continue;
        }
        let value = if values.len() == 1 {
            FrameHeaderValue::Single(values.into_iter().next().unwrap_or_default())
        } else {
            FrameHeaderValue::Multi(values)
        };
        out.insert(titlecase(name.as_str()), value);
    }
    out
}

/// Hop-by-hop fields the gateway owns: the peer's framing never reaches the
/// public client.
fn is_hop_by_hop(name: &str) -> bool {
    name.eq_ignore_ascii_case("transfer-encoding") || name.eq_ignore_ascii_case("content-length")
}

/// Sanitize response headers received from a peer before writing them to the
/// public client.
///
/// `transfer-encoding` and `content-length` are removed case-insensitively.
/// For buffered replies pass `Some(decoded_len)` and `content-length` is
/// re-added to match the decoded body; for streamed replies pass `None` and
/// the length stays unknown (the HTTP layer provides chunked transport).
pub fn sanitize(headers: &FrameHeaders, body_len: Option<usize>) -> FrameHeaders {
    let mut out = FrameHeaders::new();
    for (name, value) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        out.insert(titlecase(name), value.clone());
    }
    if let Some(len) = body_len {
        out.insert(
            "Content-Length".to_string(),
            FrameHeaderValue::Single(len.to_string()),
        );
    }
    out
}

/// Build an HTTP [`HeaderMap`] from sanitized frame headers. Names or values
/// the `http` crate rejects are dropped with a warning rather than failing
/// the whole response.
pub fn to_header_map(headers: &FrameHeaders) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let Ok(header_name) = HeaderName::try_from(name.as_str()) else {
            tracing::warn!(header = %name, "dropping invalid response header name");
            continue;
        };
        for v in value.iter() {
            match HeaderValue::from_str(v) {
                Ok(header_value) => {
                    map.append(header_name.clone(), header_value);
                }
                Err(_) => {
                    tracing::warn!(header = %name, "dropping invalid response header value");
                }
            }
        }
    }
    map
}

/// Inject the peer's observed remote address as `X-Forwarded-For`.
pub fn inject_forwarded_for(headers: &mut FrameHeaders, remote_ip: &str) {
    headers.insert(
        "X-Forwarded-For".to_string(),
        FrameHeaderValue::Single(remote_ip.to_string()),
    );
}

/// Whether the client asked for a chunk-streamed reply (server-sent events).
pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|accept| accept.to_ascii_lowercase().contains("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titlecases_segments() {
        assert_eq!(titlecase("content-type"), "Content-Type");
        assert_eq!(titlecase("x-forwarded-for"), "X-Forwarded-For");
        assert_eq!(titlecase("ETAG"), "Etag");
        assert_eq!(titlecase("via"), "Via");
    }

    #[test]
    fn canonicalize_folds_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));

        let frame = canonicalize(&headers);
        assert_eq!(
            frame["Set-Cookie"],
            FrameHeaderValue::Multi(vec!["a=1".into(), "b=2".into()])
        );
        assert_eq!(
            frame["Content-Type"],
            FrameHeaderValue::Single("text/html".into())
        );
    }

    #[test]
    fn sanitize_strips_hop_by_hop_case_insensitively() {
        let mut headers = FrameHeaders::new();
        headers.insert("Transfer-Encoding".into(), "chunked".to_string().into());
        headers.insert("CONTENT-LENGTH".into(), "999".to_string().into());
        headers.insert("content-type".into(), "text/plain".to_string().into());

        let sanitized = sanitize(&headers, Some(4));
        assert!(!sanitized.contains_key("Transfer-Encoding"));
        assert_eq!(
            sanitized["Content-Length"],
            FrameHeaderValue::Single("4".into())
        );
        assert_eq!(
            sanitized["Content-Type"],
            FrameHeaderValue::Single("text/plain".into())
        );
    }

    #[test]
    fn streamed_sanitize_omits_content_length() {
        let mut headers = FrameHeaders::new();
        headers.insert("Content-Length".into(), "10".to_string().into());
        headers.insert("Content-Type".into(), "text/event-stream".to_string().into());

        let sanitized = sanitize(&headers, None);
        assert!(!sanitized.contains_key("Content-Length"));
        assert!(sanitized.contains_key("Content-Type"));
    }

    #[test]
    fn event_stream_detection_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("TEXT/Event-Stream"));
        assert!(wants_event_stream(&headers));

        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        assert!(!wants_event_stream(&headers));
    }
}
