//! The capability registry: which peers are known to speak the protocol.
//!
//! # Concurrency note
//!
//! Topology callbacks arrive from substrate tasks while application tasks
//! query the registry, so the set lives in a sharded `DashMap` behind an
//! `Arc`. Clones share the same set.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use peerlink_transport::{PeerId, TopologyListener};

/// Set of peers currently connected and capable of the protocol.
///
/// ## Lifecycle
///
/// ```text
/// on_connect ──→ peer_connected() ──→ [capable]
///                                         │
/// on_disconnect ──→ peer_disconnected() ──┘──→ [unknown]
/// ```
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    /// When each peer was last reported capable.
    peers: Arc<DashMap<PeerId, Instant>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `peer` as capable. A repeated report refreshes the
    /// timestamp.
    pub fn peer_connected(&self, peer: PeerId) {
        let previous = self.peers.insert(peer, Instant::now());
        if previous.is_none() {
            tracing::debug!(%peer, "peer capable");
        }
    }

    /// Forgets `peer`. Unknown peers are ignored.
    pub fn peer_disconnected(&self, peer: PeerId) {
        if self.peers.remove(&peer).is_some() {
            tracing::debug!(%peer, "peer gone");
        }
    }

    pub fn is_capable(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    /// When `peer` was last reported capable, if it is known.
    pub fn connected_since(&self, peer: &PeerId) -> Option<Instant> {
        self.peers.get(peer).map(|entry| *entry.value())
    }

    /// Snapshot of all capable peers, in no particular order.
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl TopologyListener for PeerRegistry {
    fn on_connect(&self, peer: PeerId) {
        self.peer_connected(peer);
    }

    fn on_disconnect(&self, peer: PeerId) {
        self.peer_disconnected(peer);
    }
}
