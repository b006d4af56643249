//! dco-core — the data-channel crypto transform and peer binding store.
//!
//! `KeySlot::encapsulate` / `KeySlot::decapsulate` turn plaintext packets
//! into authenticated DATA_V2 wire packets and back. `Peer` tracks the remote
//! address a peer is reachable at and lets it be replaced under concurrent
//! lookups. Everything else here supports those two.

pub mod aead;
pub mod bind;
pub mod config;
pub mod crypto;
pub mod packet;
pub mod peer;
pub mod pktid;
pub mod stats;
pub mod wire;

pub use bind::{BindError, RemoteBinding};
pub use config::{ConfigError, DcoConfig};
pub use crypto::{CipherAlg, CryptoError, KeyConfig, KeyDirection, KeySlot, Limits};
pub use packet::{Packet, PacketError};
pub use peer::Peer;
pub use stats::{
    Direction, DropReason, DropSnapshot, DropStats, PeerStats, StatsSnapshot, TrafficCounters,
};
