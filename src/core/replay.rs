//! Re-issues a previously captured exchange through the live tunnel.
//!
//! Replay loads a stored request log, rebuilds the forwarded request from the
//! captured method, path, headers, and body, and drives it through the
//! dispatcher against whichever peer currently owns the hostname. Replies are
//! always buffered (a captured SSE exchange is not re-streamed) and run
//! under a short deadline.
use std::{fmt, sync::Arc, time::Duration};

use base64::prelude::{BASE64_STANDARD, Engine as _};
use bytes::Bytes;
use thiserror::Error;

use crate::{
    core::{
        dispatch::{DispatchError, DispatchRequest, Dispatcher},
        frame::FrameHeaders,
        registry::PeerRegistry,
        recorder::Recorder,
    },
    metrics,
    ports::log_store::{LogStore, StoreError},
};

#[derive(Debug, Error)]
pub enum ReplayError {
    /// Unknown log id, or the log belongs to a different hostname than the
    /// caller is inspecting.
    #[error("request log not found")]
    NotFound,
    /// The hostname has no live peer to replay against.
    #[error("no peer is currently connected for {0}")]
    NoPeer(String),
    /// The stored row could not be reconstructed into a request.
    #[error("stored exchange is not replayable: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// What the inspector shows after a replay completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub method: String,
    pub path: String,
    pub status: u16,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Replayed {} {} (status {})",
            self.method, self.path, self.status
        )
    }
}

pub struct ReplayEngine {
    registry: Arc<PeerRegistry>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn LogStore>,
    recorder: Recorder,
    deadline: Duration,
}

impl ReplayEngine {
    pub fn new(
        registry: Arc<PeerRegistry>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn LogStore>,
        recorder: Recorder,
        deadline: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            store,
            recorder,
            deadline,
        }
    }

    /// Replay log `log_id` on behalf of `caller_hostname`. The log must
    /// belong to the caller's hostname; ids from other hosts are
    /// indistinguishable from unknown ones.
    pub async fn replay(
        &self,
        log_id: i64,
        caller_hostname: &str,
    ) -> Result<ReplaySummary, ReplayError> {
        let result = self.replay_inner(log_id, caller_hostname).await;
        match &result {
            Ok(summary) => {
                metrics::increment_replays("ok");
                tracing::info!(log_id, status = summary.status, "replayed exchange");
            }
            Err(err) => {
                metrics::increment_replays("failed");
                tracing::warn!(log_id, error = %err, "replay failed");
            }
        }
        result
    }

    async fn replay_inner(
        &self,
        log_id: i64,
        caller_hostname: &str,
    ) -> Result<ReplaySummary, ReplayError> {
        let log = self
            .store
            .find_by_id(log_id)
            .await?
            .ok_or(ReplayError::NotFound)?;
        if log.hostname != caller_hostname {
            return Err(ReplayError::NotFound);
        }

        let peer = self
            .registry
            .lookup(&log.hostname)
            .ok_or_else(|| ReplayError::NoPeer(log.hostname.clone()))?;

        let headers: FrameHeaders = serde_json::from_str(&log.request_headers)
            .map_err(|err| ReplayError::InvalidRecord(format!("request headers: {err}")))?;
        let body = BASE64_STANDARD
            .decode(log.request_body.as_bytes())
            .map_err(|err| ReplayError::InvalidRecord(format!("request body: {err}")))?;

        let request = DispatchRequest {
            hostname: log.hostname.clone(),
            method: log.method.clone(),
            target: log.path.clone(),
            headers,
            body: Bytes::from(body),
        };

        // Replays are buffered unconditionally; a captured streamed exchange
        // is re-issued as a plain request/response pair.
        let reply = self
            .dispatcher
            .forward_buffered(&peer, &request, self.deadline)
            .await?;

        self.recorder.record(crate::core::dispatch::capture_exchange(
            &request,
            reply.status,
            &reply.headers,
            BASE64_STANDARD.encode(&reply.body),
        ));

        Ok(ReplaySummary {
            method: log.method,
            path: log.path,
            status: reply.status,
        })
    }
}
