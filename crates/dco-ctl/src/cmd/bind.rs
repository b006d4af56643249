//! Binding replacement, run against a throwaway peer.

use anyhow::{Context, Result};
use std::net::SocketAddr;

use socket2::SockAddr;

use dco_core::{Peer, RemoteBinding};

pub fn cmd_bind(addrs: &[&str]) -> Result<()> {
    let peer = Peer::new(0);

    for addr in addrs {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("{addr} is not a socket address"))?;
        let binding = RemoteBinding::from_sockaddr(&SockAddr::from(addr))
            .with_context(|| format!("rejected {addr}"))?;

        match peer.reset_binding(binding) {
            Some(old) => println!("  {old} → {addr}"),
            None => println!("  (none) → {addr}"),
        }
    }

    if let Some(current) = peer.remote_addr() {
        println!("✓ Current binding: {current}");
    }
    Ok(())
}
