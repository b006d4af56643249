//! Loopback self-test: local slot encrypts, mirrored slot decrypts.

use anyhow::{ensure, Context, Result};
use rand::RngCore;
use std::time::Instant;

use dco_core::{CryptoError, KeySlot, Packet, Peer, RemoteBinding};

use super::Loaded;

pub const DEFAULT_COUNT: usize = 1000;
pub const DEFAULT_SIZE: usize = 1400;

pub fn cmd_selftest(count: usize, size: usize) -> Result<()> {
    let loaded = Loaded::load()?;
    let local = loaded.slot(false)?;
    let remote = loaded.slot(true)?;

    // Both ends as the other sees them.
    let to_remote = Peer::with_binding(
        local.remote_peer_id(),
        RemoteBinding::new("127.0.0.1:1194".parse()?),
    );
    let from_local = Peer::new(remote.remote_peer_id());

    let mut payload = vec![0u8; size];
    let started = Instant::now();
    for i in 0..count {
        rand::thread_rng().fill_bytes(&mut payload);
        round_trip(&local, &remote, &to_remote, &from_local, &payload)
            .with_context(|| format!("packet {i} of {count}"))?;
    }
    let elapsed = started.elapsed();

    // A replayed packet must be refused.
    let mut pkt = Packet::with_headroom(loaded.limits.headroom(), &payload);
    local.encapsulate(&mut pkt, to_remote.stats())?;
    let wire = pkt.to_vec();
    remote.decapsulate(&mut Packet::from_wire(&wire), from_local.stats())?;
    let replay = remote.decapsulate(&mut Packet::from_wire(&wire), from_local.stats());
    ensure!(
        matches!(replay, Err(CryptoError::ReplayRejected(_))),
        "replayed packet was not rejected: {replay:?}"
    );
    if let Err(e) = &replay {
        from_local.drops().record(e);
    }

    let tx = to_remote.stats().snapshot();
    let rx = from_local.stats().snapshot();
    let drops = from_local.drops().snapshot();
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);

    println!("═══════════════════════════════════════");
    println!("  dco self-test");
    println!("═══════════════════════════════════════");
    println!("  Packets       : {count} x {size} bytes");
    println!("  Elapsed       : {:.3}s", elapsed.as_secs_f64());
    println!("  Throughput    : {:.1} MB/s", (count * size) as f64 / secs / 1e6);
    println!("  Ids remaining : {}", local.remaining_packet_ids());
    println!("  Replay        : rejected");
    println!();
    println!("[tx]");
    print!("{}", toml::to_string(&tx)?);
    println!("[rx]");
    print!("{}", toml::to_string(&rx)?);
    println!("[rx.drops]");
    print!("{}", toml::to_string(&drops)?);

    local.retire();
    remote.retire();
    Ok(())
}

fn round_trip(
    local: &KeySlot,
    remote: &KeySlot,
    to_remote: &Peer,
    from_local: &Peer,
    payload: &[u8],
) -> Result<()> {
    let mut pkt = Packet::with_headroom(local.limits().headroom(), payload);
    local.encapsulate(&mut pkt, to_remote.stats())?;
    ensure!(
        pkt.len() == payload.len() + local.overhead(),
        "unexpected wire length {}",
        pkt.len()
    );
    ensure!(to_remote.remote_addr().is_some(), "peer lost its binding");

    let mut pkt = Packet::from_wire(pkt.data());
    remote.decapsulate(&mut pkt, from_local.stats())?;
    ensure!(pkt.data() == payload, "payload mismatch after round trip");
    Ok(())
}
