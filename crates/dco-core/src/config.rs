//! Configuration system for dco.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $DCO_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/dco/config.toml
//!   3. ~/.config/dco/config.toml
//!
//! Key material is stored as hex strings. The file is only a convenience for
//! the operator tool and tests; a real control plane hands `KeyConfig`
//! records to `KeySlot::new` directly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crypto::{
    CipherAlg, CryptoError, KeyConfig, KeyDirection, Limits, DEFAULT_HEADROOM,
    DEFAULT_MAX_PACKET_LEN, DEFAULT_MAX_SEGMENTS,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DcoConfig {
    pub engine: EngineConfig,
    pub keys: KeysConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scatter/gather entries per packet, AAD and tag included.
    pub max_segments: usize,
    /// Bytes kept free in front of the op header for outer headers.
    pub headroom: usize,
    /// Largest buffer an encapsulated packet may grow to.
    pub max_packet_len: usize,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// "aes-gcm" is the only cipher that builds a key slot.
    pub cipher: String,
    pub key_id: u16,
    pub remote_peer_id: u32,
    /// Hex. 16 or 32 bytes.
    pub encrypt_key: String,
    pub decrypt_key: String,
    /// Hex. 8 bytes.
    pub encrypt_nonce_tail: String,
    pub decrypt_nonce_tail: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_segments: DEFAULT_MAX_SEGMENTS,
            headroom: DEFAULT_HEADROOM,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            cipher: CipherAlg::AesGcm.name().to_string(),
            key_id: 0,
            remote_peer_id: 0,
            encrypt_key: String::new(),
            decrypt_key: String::new(),
            encrypt_nonce_tail: String::new(),
            decrypt_nonce_tail: String::new(),
        }
    }
}

impl std::fmt::Debug for KeysConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysConfig")
            .field("cipher", &self.cipher)
            .field("key_id", &self.key_id)
            .field("remote_peer_id", &self.remote_peer_id)
            .finish_non_exhaustive()
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl EngineConfig {
    pub fn limits(&self) -> Result<Limits, ConfigError> {
        Ok(Limits::new(
            self.max_segments,
            self.headroom,
            self.max_packet_len,
        )?)
    }
}

impl KeysConfig {
    /// True once both directions have key material.
    pub fn is_provisioned(&self) -> bool {
        !self.encrypt_key.is_empty() && !self.decrypt_key.is_empty()
    }

    /// Decode into the record `KeySlot::new` takes. Lengths are checked there.
    pub fn to_key_config(&self) -> Result<KeyConfig, ConfigError> {
        Ok(KeyConfig {
            cipher_alg: self.cipher.parse()?,
            key_id: self.key_id,
            remote_peer_id: self.remote_peer_id,
            encrypt: KeyDirection::new(
                &decode("encrypt_key", &self.encrypt_key)?,
                &decode("encrypt_nonce_tail", &self.encrypt_nonce_tail)?,
            ),
            decrypt: KeyDirection::new(
                &decode("decrypt_key", &self.decrypt_key)?,
                &decode("decrypt_nonce_tail", &self.decrypt_nonce_tail)?,
            ),
        })
    }
}

fn decode(field: &'static str, value: &str) -> Result<Vec<u8>, ConfigError> {
    hex::decode(value.trim()).map_err(|e| ConfigError::BadHex(field, e))
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("dco")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("{0} is not valid hex: {1}")]
    BadHex(&'static str, hex::FromHexError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DcoConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read `path` if it exists, defaults otherwise. No env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DCO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            Self::default().write_to(&path)?;
        }
        Ok(path)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = self.to_toml()?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    /// Apply DCO_* overrides. Unparseable values are ignored.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
            v.and_then(|s| s.trim().parse().ok())
        }

        if let Some(n) = parsed(var("DCO_ENGINE__MAX_SEGMENTS")) {
            self.engine.max_segments = n;
        }
        if let Some(n) = parsed(var("DCO_ENGINE__HEADROOM")) {
            self.engine.headroom = n;
        }
        if let Some(n) = parsed(var("DCO_ENGINE__MAX_PACKET_LEN")) {
            self.engine.max_packet_len = n;
        }
        if let Some(n) = parsed(var("DCO_KEYS__KEY_ID")) {
            self.keys.key_id = n;
        }
        if let Some(n) = parsed(var("DCO_KEYS__REMOTE_PEER_ID")) {
            self.keys.remote_peer_id = n;
        }
    }
}
