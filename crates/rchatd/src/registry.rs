//! Connection registry - the set of live client connections.
//!
//! The registry is explicitly owned by the server and passed by `Arc` to
//! the inbound pipelines and the broadcaster; there is no global state.
//! `add`/`remove` may be called from arbitrarily many connection tasks while
//! the broadcaster takes snapshots. The inner lock is held only for map
//! mutation and snapshot cloning, never across a network write.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Write half of a client connection, shared between the pipeline that
/// registered it and the broadcaster.
pub type PeerWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Thread-safe set of live connections, keyed by remote address.
///
/// Keying by remote address makes duplicates impossible: a second `add`
/// for the same peer replaces the stale entry instead of doubling it.
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: RwLock<HashMap<SocketAddr, PeerWriter>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's write half under its remote address.
    pub async fn add(&self, addr: SocketAddr, writer: PeerWriter) {
        let mut peers = self.peers.write().await;
        peers.insert(addr, writer);
        debug!(peer = %addr, total = peers.len(), "Connection registered");
    }

    /// Removes a connection. Returns `false` when the peer was already gone
    /// (another task removed it first).
    pub async fn remove(&self, addr: SocketAddr) -> bool {
        let mut peers = self.peers.write().await;
        let removed = peers.remove(&addr).is_some();
        if removed {
            debug!(peer = %addr, remaining = peers.len(), "Connection deregistered");
        }
        removed
    }

    /// Returns a stable enumeration of the connections live at this instant.
    ///
    /// Each peer appears at most once. Peers removed after the snapshot is
    /// taken simply fail their write during broadcast and are skipped; the
    /// snapshot never blocks concurrent `add`/`remove` for longer than the
    /// clone itself.
    pub async fn snapshot(&self) -> Vec<(SocketAddr, PeerWriter)> {
        let peers = self.peers.read().await;
        peers
            .iter()
            .map(|(addr, writer)| (*addr, Arc::clone(writer)))
            .collect()
    }

    /// Removes and returns every connection, for shutdown.
    pub async fn drain(&self) -> Vec<(SocketAddr, PeerWriter)> {
        let mut peers = self.peers.write().await;
        peers.drain().collect()
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether the registry holds no connections.
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
