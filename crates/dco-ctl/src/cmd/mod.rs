//! CLI command modules.

pub mod bind;
pub mod config;
pub mod packet;
pub mod selftest;

use anyhow::{Context, Result};
use std::sync::Arc;

use dco_core::{DcoConfig, KeySlot, Limits};

/// Effective config and the buffer limits it validates to.
pub struct Loaded {
    pub config: DcoConfig,
    pub limits: Limits,
}

impl Loaded {
    pub fn load() -> Result<Self> {
        let config = DcoConfig::load()
            .with_context(|| format!("failed to load {}", DcoConfig::file_path().display()))?;
        let limits = config.engine.limits().context("invalid [engine] section")?;
        Ok(Self { config, limits })
    }

    /// The local slot, or the one the remote end holds if `mirror` is set.
    pub fn slot(&self, mirror: bool) -> Result<Arc<KeySlot>> {
        if !self.config.keys.is_provisioned() {
            anyhow::bail!(
                "no key material in {} (try `dco-ctl init --random-keys`)",
                DcoConfig::file_path().display()
            );
        }
        let mut keys = self
            .config
            .keys
            .to_key_config()
            .context("invalid [keys] section")?;
        if mirror {
            keys = keys.mirrored();
        }
        KeySlot::new(&keys, self.limits).context("failed to build key slot")
    }
}
