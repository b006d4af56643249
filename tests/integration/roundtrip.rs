use crate::*;

use bytes::Bytes;
use rand::{Rng, RngCore};

use dco_core::wire::{ENCAP_OVERHEAD, OP_SIZE_V2, TAG_SIZE};
use dco_core::{KeyDirection, PeerStats, StatsSnapshot};

const MTU: usize = 1500;

#[test]
fn test_every_length_up_to_mtu() {
    for key_len in [16, 32] {
        let (local, remote) = slot_pair(key_len).unwrap();
        let mut rng = rand::thread_rng();

        for len in 0..=MTU {
            let mut payload = vec![0u8; len];
            rng.fill_bytes(&mut payload);

            let wire = seal(&local, &payload).unwrap();
            assert_eq!(wire.len(), len + ENCAP_OVERHEAD, "aes-{} len {len}", key_len * 8);
            assert_eq!(open(&remote, &wire).unwrap(), payload, "aes-{} len {len}", key_len * 8);
        }
    }
}

/// 32-byte keys both ways, key id 1, a 20-byte payload.
#[test]
fn test_twenty_byte_scenario() {
    let (local, remote) = slot_pair(32).unwrap();
    let payload: Vec<u8> = (0u8..20).collect();

    let wire = seal(&local, &payload).unwrap();
    // op32 (4) + packet id (4) + payload (20) + tag (16)
    assert_eq!(wire.len(), OP_SIZE_V2 + 4 + 20 + TAG_SIZE);
    assert_eq!(wire.len(), 44);
    assert_eq!(wire[0], (9 << 3) | 1);
    assert_eq!(&wire[1..4], &[0xAB, 0xCD, 0xEF]);
    assert_eq!(wire_packet_id(&wire), 1);

    assert_eq!(open(&remote, &wire).unwrap(), payload);
}

#[test]
fn test_four_byte_salts_are_rejected() {
    let mut config = key_config(32);
    config.encrypt = KeyDirection::new(&[0x11; 32], &[0xA1; 4]);
    config.decrypt = KeyDirection::new(&[0x22; 32], &[0xB2; 4]);

    let err = KeySlot::new(&config, Limits::default()).unwrap_err();
    assert!(matches!(err, CryptoError::InvalidKeyMaterial { .. }), "{err}");
}

#[test]
fn test_fragmented_payloads() {
    let (local, remote) = slot_pair(32).unwrap();
    let mut rng = rand::thread_rng();

    for _ in 0..50 {
        let head_len = rng.gen_range(0..200);
        let frag_count = rng.gen_range(1..=8);

        let mut expected = vec![0u8; head_len];
        rng.fill_bytes(&mut expected);
        let mut pkt = Packet::with_headroom(local.limits().headroom(), &expected);

        for _ in 0..frag_count {
            let mut frag = vec![0u8; rng.gen_range(1..300)];
            rng.fill_bytes(&mut frag);
            expected.extend_from_slice(&frag);
            pkt.add_fragment(Bytes::from(frag));
        }

        local.encapsulate(&mut pkt, &()).unwrap();
        assert_eq!(pkt.len(), expected.len() + ENCAP_OVERHEAD);
        assert_eq!(open(&remote, &pkt.to_vec()).unwrap(), expected);
    }
}

#[test]
fn test_fragmented_wire_packet() {
    let (local, remote) = slot_pair(16).unwrap();
    let wire = seal(&local, &[0x5A; 700]).unwrap();

    // The receive path may hand over a packet split across buffers.
    let (head, rest) = wire.split_at(30);
    let (mid, tail) = rest.split_at(500);
    let mut pkt = Packet::from_wire(head);
    pkt.add_fragment(Bytes::copy_from_slice(mid));
    pkt.add_fragment(Bytes::copy_from_slice(tail));

    remote.decapsulate(&mut pkt, &()).unwrap();
    assert_eq!(pkt.to_vec(), vec![0x5A; 700]);
}

#[test]
fn test_counters_follow_traffic() {
    let (local, remote) = slot_pair(32).unwrap();
    let tx = PeerStats::new();
    let rx = PeerStats::new();

    let mut total = 0u64;
    for len in [0usize, 1, 100, 1400] {
        let mut pkt = Packet::with_headroom(64, &vec![1u8; len]);
        local.encapsulate(&mut pkt, &tx).unwrap();
        let mut pkt = Packet::from_wire(pkt.data());
        remote.decapsulate(&mut pkt, &rx).unwrap();
        total += len as u64;
    }

    // A dropped packet is not counted.
    let _ = remote.decapsulate(&mut Packet::from_wire(&[0u8; 10]), &rx);

    assert_eq!(
        tx.snapshot(),
        StatsSnapshot {
            tx_bytes: total,
            tx_packets: 4,
            ..Default::default()
        }
    );
    assert_eq!(
        rx.snapshot(),
        StatsSnapshot {
            rx_bytes: total,
            rx_packets: 4,
            ..Default::default()
        }
    );
}

#[test]
fn test_tight_limits() {
    let config = key_config(32);
    let limits = Limits::new(3, 0, 100 + ENCAP_OVERHEAD).unwrap();
    let local = KeySlot::new(&config, limits).unwrap();
    let remote = KeySlot::new(&config.mirrored(), limits).unwrap();

    // Exactly fills the buffer.
    let wire = seal(&local, &[7u8; 100]).unwrap();
    assert_eq!(open(&remote, &wire).unwrap(), vec![7u8; 100]);

    // One byte over.
    assert!(matches!(
        seal(&local, &[7u8; 101]),
        Err(CryptoError::InsufficientBuffer(_))
    ));

    // One data segment is all that fits alongside AAD and tag.
    let mut pkt = Packet::with_headroom(0, &[1u8; 10]);
    pkt.add_fragment(Bytes::from_static(&[2u8; 10]));
    assert!(matches!(
        local.encapsulate(&mut pkt, &()),
        Err(CryptoError::TooManyFragments { segments: 4, max: 3 })
    ));
}
