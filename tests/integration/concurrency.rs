use crate::*;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Barrier, Mutex};
use std::thread;

use rand::seq::SliceRandom;
use socket2::SockAddr;

use dco_core::pktid::REPLAY_WINDOW_SIZE;
use dco_core::{Peer, RemoteBinding};

const THREADS: usize = 8;

fn binding(port: u16) -> RemoteBinding {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), port);
    RemoteBinding::from_sockaddr(&SockAddr::from(addr)).expect("valid IPv4 binding")
}

// ── Sequence numbers ──────────────────────────────────────────────────────────

#[test]
fn test_concurrent_encapsulate_assigns_contiguous_ids() {
    let (local, remote) = slot_pair(32).unwrap();
    let per_thread = REPLAY_WINDOW_SIZE as usize / THREADS;

    let wires: Vec<Vec<u8>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let local = &local;
                s.spawn(move || {
                    (0..per_thread)
                        .map(|i| seal(local, &[t as u8, i as u8]).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let mut ids: Vec<u32> = wires.iter().map(|w| wire_packet_id(w)).collect();
    ids.sort_unstable();
    let expected: Vec<u32> = (1..=(THREADS * per_thread) as u32).collect();
    assert_eq!(ids, expected, "ids must be exactly 1..=N with no gaps");
    assert_eq!(
        local.remaining_packet_ids(),
        u64::from(u32::MAX) - (THREADS * per_thread) as u64
    );

    // Everything fits the window, so any arrival order is accepted.
    let mut shuffled = wires;
    shuffled.shuffle(&mut rand::thread_rng());
    let chunks: Vec<&[Vec<u8>]> = shuffled.chunks(per_thread).collect();
    thread::scope(|s| {
        for chunk in &chunks {
            let remote = &remote;
            s.spawn(move || {
                for wire in chunk.iter() {
                    let payload = open(remote, wire).unwrap();
                    assert_eq!(payload.len(), 2);
                }
            });
        }
    });
}

#[test]
fn test_concurrent_replay_accepts_once() {
    let (local, remote) = slot_pair(16).unwrap();

    for round in 0..20 {
        let wire = seal(&local, &[round as u8; 64]).unwrap();
        let barrier = Barrier::new(THREADS);
        let accepted = Mutex::new(0usize);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    match open(&remote, &wire) {
                        Ok(_) => *accepted.lock().unwrap() += 1,
                        Err(CryptoError::ReplayRejected(_)) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                });
            }
        });

        assert_eq!(*accepted.lock().unwrap(), 1, "round {round}");
    }
}

// ── Slot lifetime ─────────────────────────────────────────────────────────────

#[test]
fn test_retired_slot_lives_until_last_packet() {
    let (local, remote) = slot_pair(32).unwrap();
    let weak = Arc::downgrade(&local);
    let in_flight = Arc::clone(&local);
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            barrier.wait();
            // The control plane has let go; this packet still completes.
            let wire = seal(&in_flight, b"late").unwrap();
            assert_eq!(open(&remote, &wire).unwrap(), b"late");
        });
        local.retire();
        barrier.wait();
    });

    assert!(weak.upgrade().is_some());
    drop(in_flight);
    assert!(weak.upgrade().is_none());
}

// ── Binding store ─────────────────────────────────────────────────────────────

#[test]
fn test_lookups_never_see_torn_or_stale_bindings() {
    const UPDATES: u16 = 2000;
    let peer = Peer::with_binding(1, binding(1));

    thread::scope(|s| {
        s.spawn(|| {
            for port in 2..=UPDATES {
                let old = peer.reset_binding(binding(port)).unwrap();
                assert_eq!(old.addr().port(), port - 1);
            }
        });

        for _ in 0..THREADS {
            s.spawn(|| {
                let mut last = 0u16;
                loop {
                    let guard = peer.binding();
                    let current = guard.as_deref().expect("binding never cleared");
                    let addr = current.addr();
                    assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)));
                    // The writer only moves forward.
                    assert!(addr.port() >= last, "{} after {last}", addr.port());
                    last = addr.port();
                    if last == UPDATES {
                        break;
                    }
                }
            });
        }
    });

    assert_eq!(peer.remote_addr().map(|a| a.port()), Some(UPDATES));
}

#[test]
fn test_concurrent_writers_lose_no_binding() {
    const PER_WRITER: u16 = 250;
    let peer = Peer::new(2);
    let retired = Mutex::new(Vec::new());

    thread::scope(|s| {
        for w in 0..THREADS as u16 {
            let peer = &peer;
            let retired = &retired;
            s.spawn(move || {
                for i in 0..PER_WRITER {
                    let port = 1 + w * PER_WRITER + i;
                    if let Some(old) = peer.reset_binding(binding(port)) {
                        retired.lock().unwrap().push(old.addr().port());
                    }
                }
            });
        }
    });

    // Every binding installed was either retired exactly once or is current.
    let mut seen = retired.into_inner().unwrap();
    seen.extend(peer.remote_addr().map(|a| a.port()));
    seen.sort_unstable();
    let expected: Vec<u16> = (1..=THREADS as u16 * PER_WRITER).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_reader_guard_keeps_retired_binding_alive() {
    let peer = Peer::with_binding(3, binding(1000));
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        let reader = s.spawn(|| {
            let guard = peer.binding();
            barrier.wait(); // writer replaces now
            barrier.wait(); // replacement done
            guard.as_deref().map(|b| b.addr().port())
        });

        barrier.wait();
        let old = peer.reset_binding(binding(2000)).unwrap();
        barrier.wait();

        // The reader still saw the binding it loaded.
        assert_eq!(reader.join().unwrap(), Some(1000));
        assert_eq!(old.addr().port(), 1000);
    });

    assert_eq!(peer.remote_addr().map(|a| a.port()), Some(2000));
}
