//! One-shot encapsulate / decapsulate.
//!
//! Each run builds a fresh slot, so `encap` always uses packet id 1 and
//! `decap` starts from an empty replay window.

use anyhow::{Context, Result};

use dco_core::{DropStats, Packet, PeerStats};

use super::Loaded;

pub fn cmd_encap(payload_hex: &str) -> Result<()> {
    let loaded = Loaded::load()?;
    let slot = loaded.slot(false)?;
    let payload = hex::decode(payload_hex.trim()).context("payload is not valid hex")?;

    let mut pkt = Packet::with_headroom(loaded.limits.headroom(), &payload);
    slot.encapsulate(&mut pkt, &())
        .context("encapsulation failed")?;

    println!("{}", hex::encode(pkt.data()));
    Ok(())
}

pub fn cmd_decap(wire_hex: &str, mirror: bool) -> Result<()> {
    let loaded = Loaded::load()?;
    let slot = loaded.slot(mirror)?;
    let wire = hex::decode(wire_hex.trim()).context("packet is not valid hex")?;

    let stats = PeerStats::new();
    let drops = DropStats::new();
    let mut pkt = Packet::from_wire(&wire);
    if let Err(e) = slot.decapsulate(&mut pkt, &stats) {
        let reason = drops.record(&e);
        tracing::debug!(error = %e, ?reason, len = wire.len(), "decapsulation failed");
        anyhow::bail!("packet dropped: {e}");
    }

    println!("{}", hex::encode(pkt.data()));
    Ok(())
}
