//! Per-peer traffic and drop counters.
//!
//! The engine reports every successfully transformed packet here, keyed by
//! direction. Dropped packets are counted separately, keyed by why they were
//! dropped. Counters are plain relaxed atomics; a missed or torn snapshot
//! is harmless.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

use crate::crypto::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Sink for packet counters. Recording must never fail or block.
pub trait TrafficCounters: Send + Sync {
    fn record(&self, dir: Direction, bytes: usize);
}

/// Discards everything.
impl TrafficCounters for () {
    fn record(&self, _dir: Direction, _bytes: usize) {}
}

/// One direction's counters.
#[derive(Debug, Default)]
pub struct PeerStat {
    bytes: AtomicU64,
    packets: AtomicU32,
}

impl PeerStat {
    fn add(&self, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn packets(&self) -> u32 {
        self.packets.load(Ordering::Relaxed)
    }
}

/// Rx and tx counters for one peer.
#[derive(Debug, Default)]
pub struct PeerStats {
    pub rx: PeerStat,
    pub tx: PeerStat,
}

impl PeerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_bytes: self.rx.bytes(),
            rx_packets: self.rx.packets(),
            tx_bytes: self.tx.bytes(),
            tx_packets: self.tx.packets(),
        }
    }
}

impl TrafficCounters for PeerStats {
    fn record(&self, dir: Direction, bytes: usize) {
        match dir {
            Direction::Rx => self.rx.add(bytes),
            Direction::Tx => self.tx.add(bytes),
        }
    }
}

/// Point-in-time copy of a peer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub rx_bytes: u64,
    pub rx_packets: u32,
    pub tx_bytes: u64,
    pub tx_packets: u32,
}

/// Why a packet was dropped on the data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No room for the header and tag within the buffer limit.
    NoBuffer,
    TooManyFragments,
    /// Send ids ran out; the slot needs a rekey.
    Exhausted,
    /// Not a data packet, or too short to be one.
    Malformed,
    AuthFailed,
    Replay,
}

impl DropReason {
    pub const ALL: [DropReason; 6] = [
        DropReason::NoBuffer,
        DropReason::TooManyFragments,
        DropReason::Exhausted,
        DropReason::Malformed,
        DropReason::AuthFailed,
        DropReason::Replay,
    ];

    /// `None` for configuration errors, which never reach a packet.
    pub fn of(err: &CryptoError) -> Option<Self> {
        let reason = match err {
            CryptoError::UnsupportedAlgorithm(_)
            | CryptoError::InvalidKeyMaterial { .. }
            | CryptoError::InvalidLimits(_) => return None,
            CryptoError::InsufficientBuffer(_) => DropReason::NoBuffer,
            CryptoError::TooManyFragments { .. } => DropReason::TooManyFragments,
            CryptoError::SequenceExhausted(_) => DropReason::Exhausted,
            CryptoError::UnsupportedOpcode(_) | CryptoError::Truncated { .. } => {
                DropReason::Malformed
            }
            CryptoError::AuthenticationFailed => DropReason::AuthFailed,
            CryptoError::ReplayRejected(_) => DropReason::Replay,
        };
        Some(reason)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Dropped-packet counters for one peer, one per [`DropReason`].
#[derive(Debug, Default)]
pub struct DropStats {
    counts: [AtomicU64; DropReason::ALL.len()],
}

impl DropStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `err` against its reason. Returns the reason, or `None` if the
    /// error is not a packet drop and nothing was counted.
    pub fn record(&self, err: &CryptoError) -> Option<DropReason> {
        let reason = DropReason::of(err)?;
        self.counts[reason.index()].fetch_add(1, Ordering::Relaxed);
        Some(reason)
    }

    pub fn count(&self, reason: DropReason) -> u64 {
        self.counts[reason.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        DropReason::ALL.iter().map(|r| self.count(*r)).sum()
    }

    pub fn snapshot(&self) -> DropSnapshot {
        DropSnapshot {
            no_buffer: self.count(DropReason::NoBuffer),
            too_many_fragments: self.count(DropReason::TooManyFragments),
            exhausted: self.count(DropReason::Exhausted),
            malformed: self.count(DropReason::Malformed),
            auth_failed: self.count(DropReason::AuthFailed),
            replay: self.count(DropReason::Replay),
        }
    }
}

/// Point-in-time copy of a peer's drop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropSnapshot {
    pub no_buffer: u64,
    pub too_many_fragments: u64,
    pub exhausted: u64,
    pub malformed: u64,
    pub auth_failed: u64,
    pub replay: u64,
}
