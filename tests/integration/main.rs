//! dco integration test harness.
//!
//! Everything here runs in-process: two key slots facing each other stand in
//! for the two tunnel endpoints, and plain threads stand in for the
//! concurrent packet paths.
//!
//!   cargo test --test integration

use std::sync::Arc;

use anyhow::Result;

use dco_core::wire::NONCE_TAIL_SIZE;
use dco_core::{CipherAlg, CryptoError, KeyConfig, KeyDirection, KeySlot, Limits, Packet};

mod concurrency;
mod roundtrip;
mod tamper;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const KEY_ID: u16 = 1;
pub const PEER_ID: u32 = 0x00AB_CDEF;

/// Key configuration for the local end. Keys and tails are distinct per
/// direction so a slot can never decrypt its own output.
pub fn key_config(key_len: usize) -> KeyConfig {
    KeyConfig {
        cipher_alg: CipherAlg::AesGcm,
        key_id: KEY_ID,
        remote_peer_id: PEER_ID,
        encrypt: KeyDirection::new(&pattern(key_len, 0x10), &pattern(NONCE_TAIL_SIZE, 0x80)),
        decrypt: KeyDirection::new(&pattern(key_len, 0x40), &pattern(NONCE_TAIL_SIZE, 0xC0)),
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// (local, remote): what one end sends, the other receives.
pub fn slot_pair(key_len: usize) -> Result<(Arc<KeySlot>, Arc<KeySlot>)> {
    let config = key_config(key_len);
    let local = KeySlot::new(&config, Limits::default())?;
    let remote = KeySlot::new(&config.mirrored(), Limits::default())?;
    Ok((local, remote))
}

/// Encapsulate `payload` with default headroom and return the wire bytes.
pub fn seal(slot: &KeySlot, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut pkt = Packet::with_headroom(slot.limits().headroom(), payload);
    slot.encapsulate(&mut pkt, &())?;
    Ok(pkt.to_vec())
}

/// Decapsulate wire bytes and return the payload.
pub fn open(slot: &KeySlot, wire: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut pkt = Packet::from_wire(wire);
    slot.decapsulate(&mut pkt, &())?;
    Ok(pkt.to_vec())
}

/// Packet id carried by a DATA_V2 wire packet.
pub fn wire_packet_id(wire: &[u8]) -> u32 {
    u32::from_be_bytes([wire[4], wire[5], wire[6], wire[7]])
}

// ── Smoke ─────────────────────────────────────────────────────────────────────

#[test]
fn test_slot_pair_talks_both_ways() {
    let (local, remote) = slot_pair(32).expect("slot pair");

    let wire = seal(&local, b"ping").unwrap();
    assert_eq!(open(&remote, &wire).unwrap(), b"ping");

    let wire = seal(&remote, b"pong").unwrap();
    assert_eq!(open(&local, &wire).unwrap(), b"pong");
}
