//! Peer context: the current remote binding plus traffic and drop counters.
//!
//! Lookups of the binding happen on every outbound packet and never block.
//! Replacements are rare, serialized per peer, and published with a single
//! atomic pointer swap. A retired binding stays alive until the last reader
//! that loaded it lets go of its guard.

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::{ArcSwapOption, Guard};
use parking_lot::Mutex;

use crate::bind::RemoteBinding;
use crate::stats::{DropStats, PeerStats};

pub type BindingGuard = Guard<Option<Arc<RemoteBinding>>>;

#[derive(Debug)]
pub struct Peer {
    id: u32,
    bind: ArcSwapOption<RemoteBinding>,
    // Writers only. Readers go straight to `bind`.
    lock: Mutex<()>,
    stats: PeerStats,
    drops: DropStats,
}

impl Peer {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            bind: ArcSwapOption::empty(),
            lock: Mutex::new(()),
            stats: PeerStats::new(),
            drops: DropStats::new(),
        }
    }

    pub fn with_binding(id: u32, binding: RemoteBinding) -> Self {
        let peer = Self::new(id);
        peer.bind.store(Some(Arc::new(binding)));
        peer
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Install `binding` as current and hand back the one it replaced.
    ///
    /// Concurrent lookups see either the old or the new binding. The returned
    /// handle (and any outstanding guard) keeps the old one alive; it is freed
    /// when the last of them drops.
    pub fn reset_binding(&self, binding: RemoteBinding) -> Option<Arc<RemoteBinding>> {
        let _writer = self.lock.lock();
        let new = Arc::new(binding);
        let old = self.bind.swap(Some(Arc::clone(&new)));

        match &old {
            Some(prev) if **prev == *new => {}
            Some(prev) => tracing::debug!(
                peer_id = self.id,
                old = %prev,
                new = %new,
                "remote binding replaced"
            ),
            None => tracing::debug!(peer_id = self.id, new = %new, "remote binding set"),
        }
        old
    }

    /// Drop the current binding, e.g. on peer teardown.
    pub fn clear_binding(&self) -> Option<Arc<RemoteBinding>> {
        let _writer = self.lock.lock();
        let old = self.bind.swap(None);
        if old.is_some() {
            tracing::debug!(peer_id = self.id, "remote binding cleared");
        }
        old
    }

    /// Wait-free read of the current binding.
    ///
    /// Hold the guard only for the duration of one packet; long-lived copies
    /// should use `binding_full`.
    pub fn binding(&self) -> BindingGuard {
        self.bind.load()
    }

    pub fn binding_full(&self) -> Option<Arc<RemoteBinding>> {
        self.bind.load_full()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.bind.load().as_deref().map(RemoteBinding::addr)
    }

    pub fn stats(&self) -> &PeerStats {
        &self.stats
    }

    pub fn drops(&self) -> &DropStats {
        &self.drops
    }
}
