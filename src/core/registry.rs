//! Process-wide hostname → peer registry.
//!
//! Reads happen on every public request; writes only on peer connect and
//! disconnect. `scc::HashMap` keeps the lookup path lock-free while bind and
//! unbind get entry-level atomicity.
use std::sync::Arc;

use scc::hash_map::Entry;

use crate::core::peer::Peer;

/// At most one live peer per hostname at any instant. Binding a hostname that
/// is already taken evicts the prior peer: it is closed (failing its in-flight
/// dispatches) before the new peer is installed.
#[derive(Default)]
pub struct PeerRegistry {
    peers: scc::HashMap<String, Arc<Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `hostname` with `peer`, returning the evicted prior peer if
    /// one was bound.
    pub async fn bind(&self, hostname: &str, peer: Arc<Peer>) -> Option<Arc<Peer>> {
        let evicted = match self.peers.entry_async(hostname.to_string()).await {
            Entry::Occupied(mut occupied) => {
                let prior = occupied.get().clone();
                prior.close();
                *occupied.get_mut() = peer;
                Some(prior)
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(peer);
                None
            }
        };
        if evicted.is_some() {
            tracing::info!(hostname, "evicted prior peer on rebind");
        }
        evicted
    }

    /// Current peer for a hostname, if any.
    pub fn lookup(&self, hostname: &str) -> Option<Arc<Peer>> {
        self.peers.read(hostname, |_, peer| peer.clone())
    }

    /// Remove the binding, but only if it still points at `peer`. A peer that
    /// was evicted by a racing reconnection must not tear down its successor.
    pub async fn unbind(&self, hostname: &str, peer: &Arc<Peer>) {
        self.peers
            .remove_if_async(hostname, |bound| Arc::ptr_eq(bound, peer))
            .await;
    }

    /// Number of bound hostnames.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
