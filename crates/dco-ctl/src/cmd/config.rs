//! Config inspection and bootstrap.

use anyhow::{Context, Result};
use rand::RngCore;

use dco_core::wire::NONCE_TAIL_SIZE;
use dco_core::DcoConfig;

pub fn cmd_config() -> Result<()> {
    let config = DcoConfig::load().context("failed to load config")?;
    let mut shown = config.clone();
    for secret in [
        &mut shown.keys.encrypt_key,
        &mut shown.keys.decrypt_key,
        &mut shown.keys.encrypt_nonce_tail,
        &mut shown.keys.decrypt_nonce_tail,
    ] {
        if !secret.is_empty() {
            *secret = format!("<{} bytes>", secret.len() / 2);
        }
    }

    println!("# {}", DcoConfig::file_path().display());
    print!("{}", shown.to_toml()?);
    Ok(())
}

pub fn cmd_init(random_keys: bool) -> Result<()> {
    let path = DcoConfig::file_path();
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }

    if !random_keys {
        let path = DcoConfig::write_default_if_missing()?;
        println!("✓ Wrote default config: {}", path.display());
        return Ok(());
    }

    let mut config = DcoConfig::default();
    config.keys.encrypt_key = random_hex(32);
    config.keys.decrypt_key = random_hex(32);
    config.keys.encrypt_nonce_tail = random_hex(NONCE_TAIL_SIZE);
    config.keys.decrypt_nonce_tail = random_hex(NONCE_TAIL_SIZE);
    config.write_to(&path)?;

    tracing::info!(path = %path.display(), "generated random key material");
    println!("✓ Wrote config with random keys: {}", path.display());
    Ok(())
}

fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
