use crate::*;

use rand::RngCore;

use dco_core::wire::{DATA_V1, OPCODE_SHIFT, TAG_SIZE};
use dco_core::{DropReason, DropSnapshot, Peer};

/// Bits of the first byte that hold the opcode.
fn is_opcode_bit(byte: usize, bit: u32) -> bool {
    byte == 0 && bit >= u32::from(OPCODE_SHIFT)
}

#[test]
fn test_every_single_bit_flip_is_rejected() {
    let (local, remote) = slot_pair(32).unwrap();
    let payload: Vec<u8> = (0u8..20).collect();
    let wire = seal(&local, &payload).unwrap();

    for byte in 0..wire.len() {
        for bit in 0..8u32 {
            let mut forged = wire.clone();
            forged[byte] ^= 1 << bit;

            let err = open(&remote, &forged).unwrap_err();
            if is_opcode_bit(byte, bit) {
                // Not a data packet any more; rejected before any crypto.
                assert!(
                    matches!(err, CryptoError::UnsupportedOpcode(_)),
                    "byte {byte} bit {bit}: {err}"
                );
            } else {
                assert!(
                    matches!(err, CryptoError::AuthenticationFailed),
                    "byte {byte} bit {bit}: {err}"
                );
            }
        }
    }

    // None of the forgeries moved the replay window.
    assert_eq!(open(&remote, &wire).unwrap(), payload);
}

#[test]
fn test_flipped_packet_id_does_not_burn_the_real_one() {
    let (local, remote) = slot_pair(16).unwrap();
    let first = seal(&local, b"first").unwrap();
    let second = seal(&local, b"second").unwrap();

    // Rewrite packet 1 to claim id 2: authentication fails and id 2 stays free.
    let mut forged = first.clone();
    forged[7] = 2;
    assert!(matches!(
        open(&remote, &forged),
        Err(CryptoError::AuthenticationFailed)
    ));

    assert_eq!(open(&remote, &second).unwrap(), b"second");
    assert_eq!(open(&remote, &first).unwrap(), b"first");
}

#[test]
fn test_every_truncation_is_rejected() {
    let (local, remote) = slot_pair(32).unwrap();
    let wire = seal(&local, &[0xEE; 40]).unwrap();

    for len in 0..wire.len() {
        let err = open(&remote, &wire[..len]).unwrap_err();
        let expected = if len < 4 + 4 + TAG_SIZE {
            matches!(err, CryptoError::Truncated { .. })
        } else {
            // Long enough to parse, but the tag no longer lines up.
            matches!(err, CryptoError::AuthenticationFailed)
        };
        assert!(expected, "len {len}: {err}");
    }
}

#[test]
fn test_random_garbage_is_rejected() {
    let (local, remote) = slot_pair(32).unwrap();
    let template = seal(&local, &[0u8; 64]).unwrap();
    let mut rng = rand::thread_rng();

    for _ in 0..500 {
        // Keep a valid header, randomise everything after it.
        let mut forged = template.clone();
        rng.fill_bytes(&mut forged[8..]);
        assert!(matches!(
            open(&remote, &forged),
            Err(CryptoError::AuthenticationFailed)
        ));
    }
}

#[test]
fn test_wrong_keys_fail_authentication() {
    let (local, _) = slot_pair(32).unwrap();
    let (_, stranger) = slot_pair(16).unwrap();
    let wire = seal(&local, b"for someone else").unwrap();

    assert!(matches!(
        open(&stranger, &wire),
        Err(CryptoError::AuthenticationFailed)
    ));
    // Nor can the sender read its own traffic.
    assert!(matches!(
        open(&local, &wire),
        Err(CryptoError::AuthenticationFailed)
    ));
}

#[test]
fn test_v2_body_relabelled_as_v1_fails() {
    let (local, remote) = slot_pair(32).unwrap();
    let wire = seal(&local, &[0x33; 32]).unwrap();

    // Same bytes, but claim the legacy header: AAD and IV both shift.
    let mut forged = wire.clone();
    forged[0] = (DATA_V1 << OPCODE_SHIFT) | (forged[0] & 0x07);
    let err = open(&remote, &forged).unwrap_err();
    assert!(matches!(err, CryptoError::AuthenticationFailed), "{err}");
    assert!(err.is_security());
}

#[test]
fn test_rejections_land_in_peer_drop_counters() {
    let (local, remote) = slot_pair(32).unwrap();
    let peer = Peer::new(0xABCDEF);
    let wire = seal(&local, b"counted").unwrap();

    let mut forged = wire.clone();
    *forged.last_mut().unwrap() ^= 0x01;
    let attempts: [&[u8]; 4] = [&forged, &wire[..10], &wire, &wire];

    let mut reasons = Vec::new();
    for attempt in attempts {
        match open(&remote, attempt) {
            Ok(payload) => assert_eq!(payload, b"counted"),
            Err(e) => reasons.push(peer.drops().record(&e).unwrap()),
        }
    }

    assert_eq!(
        reasons,
        [DropReason::AuthFailed, DropReason::Malformed, DropReason::Replay]
    );
    assert_eq!(
        peer.drops().snapshot(),
        DropSnapshot {
            auth_failed: 1,
            malformed: 1,
            replay: 1,
            ..Default::default()
        }
    );
    assert_eq!(peer.drops().total(), 3);
}
