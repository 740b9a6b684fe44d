//! Host-header normalization.
//!
//! Routing and credential lookup key on a normalized hostname: lowercased,
//! port stripped, validated by parsing the header as a URL authority.
use axum::http::uri::Authority;
use thiserror::Error;

/// The Host header was absent or did not parse as a URL authority.
#[derive(Debug, Error)]
#[error("invalid Host header: {0:?}")]
pub struct InvalidHost(pub String);

/// Normalize a raw `Host` header value into a registry key.
pub fn normalize_hostname(host_header: &str) -> Result<String, InvalidHost> {
    let raw = host_header.trim();
    if raw.is_empty() || raw.contains('@') {
        return Err(InvalidHost(host_header.to_string()));
    }
    let authority: Authority = raw
        .parse()
        .map_err(|_| InvalidHost(host_header.to_string()))?;
    Ok(authority.host().to_ascii_lowercase())
}
