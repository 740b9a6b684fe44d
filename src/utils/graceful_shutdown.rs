//! Shutdown signalling for the serve loop.
//!
//! A single `watch` cell holds the shutdown reason once one exists. The first
//! request wins, every listener sees the same reason, and listeners that
//! subscribe after the fact still resolve immediately. Peers are not drained:
//! an in-flight dispatch whose process exits looks like a peer disconnect
//! from the other side, which the protocol already handles.
use tokio::sync::watch;

/// Why the process is going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An operator signal (SIGINT or SIGTERM) asked the process to stop.
    Signal,
    /// The shutdown channel itself went away; stop immediately.
    ChannelLost,
}

/// Coordinates shutdown between the signal listener, the accept loop, and
/// background workers.
pub struct GracefulShutdown {
    state: watch::Sender<Option<ShutdownReason>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    /// True once a shutdown has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Ask the process to stop. The first reason sticks; later requests are
    /// ignored so every listener agrees on why the process went down.
    pub fn request_shutdown(&self, reason: ShutdownReason) {
        self.state.send_if_modified(|current| {
            if current.is_some() {
                tracing::debug!(?reason, "shutdown already in progress, ignoring request");
                return false;
            }
            tracing::info!(?reason, "shutting down");
            *current = Some(reason);
            true
        });
    }

    /// Resolves with the reason once shutdown has been requested, including
    /// when it was requested before this call.
    pub async fn signalled(&self) -> ShutdownReason {
        let mut rx = self.state.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).unwrap_or(ShutdownReason::ChannelLost),
            Err(_) => ShutdownReason::ChannelLost,
        }
    }

    /// Block on the OS signals the gateway answers to and translate the
    /// first one into a shutdown request. Run this on its own task.
    pub async fn listen_for_signals(&self) {
        wait_for_stop_signal().await;
        self.request_shutdown(ShutdownReason::Signal);
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::{ctrl_c, unix};

    match unix::signal(unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c() => tracing::info!("caught SIGINT, stopping"),
                _ = sigterm.recv() => tracing::info!("caught SIGTERM, stopping"),
            }
        }
        Err(err) => {
            // Without a SIGTERM handler the process still stops on SIGINT.
            tracing::error!(error = %err, "SIGTERM handler unavailable, listening for SIGINT only");
            let _ = ctrl_c().await;
            tracing::info!("caught SIGINT, stopping");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("caught interrupt, stopping");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn starts_without_a_pending_shutdown() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.shutdown_requested());
    }

    #[tokio::test]
    async fn the_first_reason_wins() {
        let shutdown = GracefulShutdown::new();
        shutdown.request_shutdown(ShutdownReason::Signal);
        shutdown.request_shutdown(ShutdownReason::ChannelLost);

        assert!(shutdown.shutdown_requested());
        assert_eq!(shutdown.signalled().await, ShutdownReason::Signal);
    }

    #[tokio::test]
    async fn late_listeners_still_resolve() {
        let shutdown = GracefulShutdown::new();
        shutdown.request_shutdown(ShutdownReason::Signal);

        // Subscribing after the request must not hang.
        let reason = tokio::time::timeout(Duration::from_secs(1), shutdown.signalled())
            .await
            .expect("listener hung after shutdown was already requested");
        assert_eq!(reason, ShutdownReason::Signal);
    }

    #[tokio::test]
    async fn concurrent_listeners_agree_on_the_reason() {
        let shutdown = std::sync::Arc::new(GracefulShutdown::new());

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.signalled().await })
        };
        shutdown.request_shutdown(ShutdownReason::Signal);

        assert_eq!(waiter.await.unwrap(), ShutdownReason::Signal);
        assert_eq!(shutdown.signalled().await, ShutdownReason::Signal);
    }
}
