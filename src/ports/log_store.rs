//! Port for the persistent store of captured request/response exchanges.
//!
//! The relational implementation lives behind this trait; the core only
//! depends on the column semantics: header maps as JSON text, bodies as
//! base64 (or the streamed-body sentinel), store-assigned ids, retrieval
//! ordered by creation time.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stored in place of a response body that was streamed straight through to
/// the client and never buffered by the gateway.
pub const STREAMED_BODY_SENTINEL: &str = "[streamed response: body streamed directly to client]";

/// Persistence failures. Logged and dropped by the recorder; surfaced to the
/// caller only where the user asked for the data (inspector, replay).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// One captured exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    /// Store-assigned identifier.
    pub id: i64,
    pub hostname: String,
    pub path: String,
    pub method: String,
    /// Canonicalized request headers, JSON text.
    pub request_headers: String,
    /// Request body, base64.
    pub request_body: String,
    pub response_status: Option<u16>,
    /// Sanitized response headers, JSON text.
    pub response_headers: String,
    /// Response body: base64, or [`STREAMED_BODY_SENTINEL`].
    pub response_body: String,
    pub created_at: DateTime<Utc>,
}

/// A row about to be inserted; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub hostname: String,
    pub path: String,
    pub method: String,
    pub request_headers: String,
    pub request_body: String,
    pub response_status: Option<u16>,
    pub response_headers: String,
    pub response_body: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    /// Persist one exchange, returning the stored row.
    async fn insert(&self, log: NewRequestLog) -> Result<RequestLog, StoreError>;

    /// Most recent rows for a hostname, newest first (`created_at` descending,
    /// id descending as tie-break).
    async fn find_recent_by_hostname(
        &self,
        hostname: &str,
        limit: usize,
    ) -> Result<Vec<RequestLog>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<RequestLog>, StoreError>;

    /// Delete every row for a hostname, returning the count removed.
    async fn delete_by_hostname(&self, hostname: &str) -> Result<u64, StoreError>;

    /// Delete rows created before `cutoff`, returning the count removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
