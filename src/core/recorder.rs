//! Fire-and-forget persistence of completed exchanges.
//!
//! Dispatches hand finished exchanges to a bounded work queue; a single
//! worker task writes them through the [`LogStore`] port and runs the
//! age-based prune pass on a periodic tick. Store failures are logged and
//! dropped; capture must never affect user-visible forwarding behavior.
use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::mpsc;

use crate::{
    config::models::RecorderConfig,
    metrics,
    ports::log_store::{LogStore, NewRequestLog},
};

/// Cloneable handle used by dispatches to enqueue a capture.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::Sender<NewRequestLog>,
}

impl Recorder {
    /// Spawn the store writer and prune loop, returning the enqueue handle.
    pub fn spawn(store: Arc<dyn LogStore>, config: &RecorderConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let retention = chrono::Duration::days(config.retention_days);
        let prune_interval = Duration::from_secs(config.prune_interval_secs.max(1));
        tokio::spawn(run_worker(store, rx, retention, prune_interval));
        Self { tx }
    }

    /// Enqueue one capture. A saturated queue drops the entry with a warning;
    /// the dispatch that produced it has already answered its client.
    pub fn record(&self, log: NewRequestLog) {
        if let Err(err) = self.tx.try_send(log) {
            metrics::increment_captures_dropped();
            tracing::warn!(error = %err, "capture queue saturated, dropping request log");
        }
    }

    /// Worker for tests that need a deterministic store handle without the
    /// global prune cadence.
    #[cfg(test)]
    pub(crate) fn spawn_with_interval(
        store: Arc<dyn LogStore>,
        queue_capacity: usize,
        retention: chrono::Duration,
        prune_interval: Duration,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let handle = tokio::spawn(run_worker(store, rx, retention, prune_interval));
        (Self { tx }, handle)
    }
}

async fn run_worker(
    store: Arc<dyn LogStore>,
    mut rx: mpsc::Receiver<NewRequestLog>,
    retention: chrono::Duration,
    prune_interval: Duration,
) {
    let mut prune_tick = tokio::time::interval(prune_interval);
    prune_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately; consume it so the
    // worker starts with an empty queue pass rather than a prune.
    prune_tick.tick().await;

    loop {
        tokio::select! {
            entry = rx.recv() => {
                let Some(log) = entry else {
                    tracing::debug!("capture queue closed, recorder worker exiting");
                    break;
                };
                let hostname = log.hostname.clone();
                if let Err(err) = store.insert(log).await {
                    tracing::error!(hostname = %hostname, error = %err, "failed to persist request log");
                } else {
                    metrics::increment_captures_recorded();
                }
            }
            _ = prune_tick.tick() => {
                let cutoff = Utc::now() - retention;
                match store.delete_older_than(cutoff).await {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::info!(removed, %cutoff, "pruned aged request logs");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "request log prune failed");
                    }
                }
            }
        }
    }
}
