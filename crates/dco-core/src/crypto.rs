//! Key slots — one negotiated key generation for a peer.
//!
//! A key slot owns two independent AES-GCM contexts (send and receive), the
//! per-direction nonce tails, the send packet id generator and the receive
//! replay window. It is built all-or-nothing from a `KeyConfig` handed down by
//! the control plane and is immutable afterwards except for those two packet
//! id sub-objects.
//!
//! Slots are shared as `Arc<KeySlot>`. Packets in flight hold a clone; the
//! control plane calls `retire` when the slot is superseded and the contexts
//! are freed once the last clone drops.
//!
//! All key material is zeroized on drop. There is no unsafe code in this
//! module.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::packet::PacketError;
use crate::pktid::{PacketIdRecv, PacketIdXmit, ReplayError, SequenceExhausted};
use crate::wire::{
    WireError, ENCAP_OVERHEAD, KEY_ID_MAX, NONCE_SIZE, NONCE_TAIL_SIZE, NONCE_WIRE_SIZE,
    PEER_ID_MAX, TAG_SIZE,
};

// ── Algorithm selector ────────────────────────────────────────────────────────

/// Cipher selector as sent by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CipherAlg {
    None = 0,
    AesGcm = 1,
    ChaCha20Poly1305 = 2,
}

impl CipherAlg {
    pub fn name(self) -> &'static str {
        match self {
            CipherAlg::None => "none",
            CipherAlg::AesGcm => "aes-gcm",
            CipherAlg::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl fmt::Display for CipherAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for CipherAlg {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CipherAlg::None),
            1 => Ok(CipherAlg::AesGcm),
            2 => Ok(CipherAlg::ChaCha20Poly1305),
            other => Err(CryptoError::UnsupportedAlgorithm(format!("selector {other}"))),
        }
    }
}

impl FromStr for CipherAlg {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CipherAlg::None),
            "aes-gcm" => Ok(CipherAlg::AesGcm),
            "chacha20-poly1305" => Ok(CipherAlg::ChaCha20Poly1305),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

// ── Key configuration ─────────────────────────────────────────────────────────

/// Key material for one direction.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct KeyDirection {
    pub cipher_key: Vec<u8>,
    pub nonce_tail: Vec<u8>,
}

impl KeyDirection {
    pub fn new(cipher_key: &[u8], nonce_tail: &[u8]) -> Self {
        Self {
            cipher_key: cipher_key.to_vec(),
            nonce_tail: nonce_tail.to_vec(),
        }
    }
}

impl fmt::Debug for KeyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDirection")
            .field("cipher_key", &format_args!("<{} bytes>", self.cipher_key.len()))
            .field("nonce_tail", &format_args!("<{} bytes>", self.nonce_tail.len()))
            .finish()
    }
}

/// Everything the control plane supplies to build a key slot.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    pub cipher_alg: CipherAlg,
    pub key_id: u16,
    pub remote_peer_id: u32,
    pub encrypt: KeyDirection,
    pub decrypt: KeyDirection,
}

impl KeyConfig {
    /// The configuration the remote end of this slot would use:
    /// directions swapped, same key id and peer id.
    pub fn mirrored(&self) -> Self {
        Self {
            cipher_alg: self.cipher_alg,
            key_id: self.key_id,
            remote_peer_id: self.remote_peer_id,
            encrypt: self.decrypt.clone(),
            decrypt: self.encrypt.clone(),
        }
    }
}

// ── Limits ────────────────────────────────────────────────────────────────────

/// Fragments a packet may carry besides its linear head.
pub const MAX_SKB_FRAGS: usize = 17;

/// Default scatter/gather capacity: data segments plus the AAD and tag entries.
pub const DEFAULT_MAX_SEGMENTS: usize = MAX_SKB_FRAGS + 2;

/// Hard ceiling for a configured scatter/gather capacity.
pub const SEGMENT_CAP: usize = 256;

/// Headroom reserved in front of the op header for the outer IP + UDP
/// headers added by the transport (40 + 8, rounded up with alignment slack).
pub const DEFAULT_HEADROOM: usize = 64;

/// Largest buffer an encapsulated packet may occupy, headroom included.
pub const DEFAULT_MAX_PACKET_LEN: usize = 65_535 + DEFAULT_HEADROOM;

/// Buffer limits applied by a key slot. Validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    max_segments: usize,
    headroom: usize,
    max_packet_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_segments: DEFAULT_MAX_SEGMENTS,
            headroom: DEFAULT_HEADROOM,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
        }
    }
}

impl Limits {
    pub fn new(
        max_segments: usize,
        headroom: usize,
        max_packet_len: usize,
    ) -> Result<Self, CryptoError> {
        // AAD entry + at least one data entry + tag entry
        if !(3..=SEGMENT_CAP).contains(&max_segments) {
            return Err(CryptoError::InvalidLimits(format!(
                "max_segments {max_segments} outside 3..={SEGMENT_CAP}"
            )));
        }
        let fits = headroom
            .checked_add(ENCAP_OVERHEAD)
            .is_some_and(|min| max_packet_len >= min);
        if !fits {
            return Err(CryptoError::InvalidLimits(format!(
                "max_packet_len {max_packet_len} cannot hold headroom {headroom} plus {ENCAP_OVERHEAD} bytes of overhead"
            )));
        }
        Ok(Self {
            max_segments,
            headroom,
            max_packet_len,
        })
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    pub fn headroom(&self) -> usize {
        self.headroom
    }

    pub fn max_packet_len(&self) -> usize {
        self.max_packet_len
    }
}

// ── Cipher contexts ───────────────────────────────────────────────────────────

/// An initialised AES-GCM context. Key length picks the variant.
pub(crate) enum AeadCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

// The IV layout and the wire format both assume these.
fn has_expected_geometry<A: AeadCore>() -> bool {
    A::NonceSize::USIZE == NONCE_SIZE && A::TagSize::USIZE == TAG_SIZE
}

impl AeadCipher {
    fn new(title: &'static str, key: &[u8]) -> Result<Self, CryptoError> {
        let invalid = || CryptoError::InvalidKeyMaterial {
            field: title,
            reason: format!("key length {} (expected 16 or 32)", key.len()),
        };

        let cipher = match key.len() {
            16 if has_expected_geometry::<Aes128Gcm>() => {
                AeadCipher::Aes128(Aes128Gcm::new_from_slice(key).map_err(|_| invalid())?)
            }
            32 if has_expected_geometry::<Aes256Gcm>() => {
                AeadCipher::Aes256(Aes256Gcm::new_from_slice(key).map_err(|_| invalid())?)
            }
            16 | 32 => {
                return Err(CryptoError::UnsupportedAlgorithm(format!(
                    "{title}: IV must be {NONCE_SIZE} bytes and tag {TAG_SIZE} bytes"
                )))
            }
            _ => return Err(invalid()),
        };

        tracing::trace!(
            title,
            key_bits = key.len() * 8,
            iv_size = NONCE_SIZE,
            auth_size = TAG_SIZE,
            "cipher context ready"
        );
        Ok(cipher)
    }

    /// Encrypt `buf` in place, returning the detached tag.
    pub(crate) fn seal(
        &self,
        iv: &[u8; NONCE_SIZE],
        aad: &[u8],
        buf: &mut [u8],
    ) -> Result<[u8; TAG_SIZE], aes_gcm::Error> {
        let nonce = GenericArray::from_slice(&iv[..]);
        let tag = match self {
            AeadCipher::Aes128(c) => c.encrypt_in_place_detached(nonce, aad, buf)?,
            AeadCipher::Aes256(c) => c.encrypt_in_place_detached(nonce, aad, buf)?,
        };
        let mut out = [0u8; TAG_SIZE];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Verify `tag` and decrypt `buf` in place.
    pub(crate) fn open(
        &self,
        iv: &[u8; NONCE_SIZE],
        aad: &[u8],
        buf: &mut [u8],
        tag: &[u8],
    ) -> Result<(), aes_gcm::Error> {
        if tag.len() != TAG_SIZE {
            return Err(aes_gcm::Error);
        }
        let nonce = GenericArray::from_slice(&iv[..]);
        let tag = GenericArray::from_slice(tag);
        match self {
            AeadCipher::Aes128(c) => c.decrypt_in_place_detached(nonce, aad, buf, tag),
            AeadCipher::Aes256(c) => c.decrypt_in_place_detached(nonce, aad, buf, tag),
        }
    }

    fn key_bits(&self) -> usize {
        match self {
            AeadCipher::Aes128(_) => 128,
            AeadCipher::Aes256(_) => 256,
        }
    }
}

/// Per-direction IV salt.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct NonceTail([u8; NONCE_TAIL_SIZE]);

impl NonceTail {
    fn from_slice(title: &'static str, bytes: &[u8]) -> Result<Self, CryptoError> {
        let tail: [u8; NONCE_TAIL_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyMaterial {
                    field: title,
                    reason: format!(
                        "nonce tail length {} (expected {NONCE_TAIL_SIZE})",
                        bytes.len()
                    ),
                })?;
        Ok(Self(tail))
    }

    /// IV = packet id (big-endian) || tail.
    pub(crate) fn iv(&self, packet_id: [u8; NONCE_WIRE_SIZE]) -> [u8; NONCE_SIZE] {
        let mut iv = [0u8; NONCE_SIZE];
        iv[..NONCE_WIRE_SIZE].copy_from_slice(&packet_id);
        iv[NONCE_WIRE_SIZE..].copy_from_slice(&self.0);
        iv
    }
}

// ── Key slot ──────────────────────────────────────────────────────────────────

/// One key generation: send and receive contexts plus packet id state.
pub struct KeySlot {
    pub(crate) key_id: u8,
    pub(crate) remote_peer_id: u32,
    pub(crate) encrypt: AeadCipher,
    pub(crate) decrypt: AeadCipher,
    pub(crate) nonce_tail_xmit: NonceTail,
    pub(crate) nonce_tail_recv: NonceTail,
    pub(crate) pid_xmit: PacketIdXmit,
    pub(crate) pid_recv: PacketIdRecv,
    pub(crate) limits: Limits,
}

impl KeySlot {
    /// Build a key slot from control-plane configuration.
    ///
    /// Either every part is initialised or nothing is returned; a failure
    /// part-way drops (and zeroizes) whatever was already built.
    pub fn new(config: &KeyConfig, limits: Limits) -> Result<Arc<Self>, CryptoError> {
        Self::build(config, limits).map(Arc::new)
    }

    pub(crate) fn build(config: &KeyConfig, limits: Limits) -> Result<Self, CryptoError> {
        if config.cipher_alg != CipherAlg::AesGcm {
            return Err(CryptoError::UnsupportedAlgorithm(
                config.cipher_alg.name().to_string(),
            ));
        }

        let key_id = u8::try_from(config.key_id)
            .ok()
            .filter(|id| *id <= KEY_ID_MAX)
            .ok_or_else(|| CryptoError::InvalidKeyMaterial {
                field: "key_id",
                reason: format!("{} does not fit 3 bits", config.key_id),
            })?;
        if config.remote_peer_id > PEER_ID_MAX {
            return Err(CryptoError::InvalidKeyMaterial {
                field: "remote_peer_id",
                reason: format!("{} does not fit 24 bits", config.remote_peer_id),
            });
        }

        let encrypt = AeadCipher::new("encrypt", &config.encrypt.cipher_key)?;
        let decrypt = AeadCipher::new("decrypt", &config.decrypt.cipher_key)?;
        let nonce_tail_xmit = NonceTail::from_slice("encrypt", &config.encrypt.nonce_tail)?;
        let nonce_tail_recv = NonceTail::from_slice("decrypt", &config.decrypt.nonce_tail)?;

        tracing::debug!(
            key_id,
            peer_id = config.remote_peer_id,
            cipher = %config.cipher_alg,
            encrypt_bits = encrypt.key_bits(),
            decrypt_bits = decrypt.key_bits(),
            "key slot ready"
        );

        Ok(Self {
            key_id,
            remote_peer_id: config.remote_peer_id,
            encrypt,
            decrypt,
            nonce_tail_xmit,
            nonce_tail_recv,
            pid_xmit: PacketIdXmit::new(),
            pid_recv: PacketIdRecv::new(),
            limits,
        })
    }

    /// Drop the control plane's reference. The slot is destroyed when the
    /// last in-flight packet releases its clone.
    pub fn retire(self: Arc<Self>) {
        tracing::debug!(
            key_id = self.key_id,
            peer_id = self.remote_peer_id,
            in_flight = Arc::strong_count(&self) - 1,
            "key slot retired"
        );
    }

    pub fn key_id(&self) -> u8 {
        self.key_id
    }

    pub fn remote_peer_id(&self) -> u32 {
        self.remote_peer_id
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Bytes encapsulation adds to a packet.
    pub fn overhead(&self) -> usize {
        ENCAP_OVERHEAD
    }

    /// Send-side packet ids left before the slot must be replaced.
    pub fn remaining_packet_ids(&self) -> u64 {
        self.pid_xmit.remaining()
    }
}

impl fmt::Debug for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySlot")
            .field("key_id", &self.key_id)
            .field("remote_peer_id", &self.remote_peer_id)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Drop for KeySlot {
    fn drop(&mut self) {
        tracing::trace!(key_id = self.key_id, "key slot destroyed");
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported cipher algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid {field} key material: {reason}")]
    InvalidKeyMaterial { field: &'static str, reason: String },

    #[error("invalid limits: {0}")]
    InvalidLimits(String),

    #[error("insufficient buffer: {0}")]
    InsufficientBuffer(#[from] PacketError),

    #[error("packet needs {segments} scatter/gather entries, capacity is {max}")]
    TooManyFragments { segments: usize, max: usize },

    #[error("send sequence exhausted, rekey required")]
    SequenceExhausted(#[from] SequenceExhausted),

    #[error("unsupported opcode: {0}")]
    UnsupportedOpcode(u8),

    #[error("packet truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("replay rejected: {0}")]
    ReplayRejected(#[from] ReplayError),
}

impl From<WireError> for CryptoError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::UnsupportedOpcode(op) => CryptoError::UnsupportedOpcode(op),
            WireError::Truncated { need, got } => CryptoError::Truncated { need, got },
        }
    }
}

impl CryptoError {
    /// Bad configuration; nothing was applied.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CryptoError::UnsupportedAlgorithm(_)
                | CryptoError::InvalidKeyMaterial { .. }
                | CryptoError::InvalidLimits(_)
        )
    }

    /// The packet must be dropped silently; no reply, no retry.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            CryptoError::AuthenticationFailed | CryptoError::ReplayRejected(_)
        )
    }

    /// The key slot can no longer send; the control plane must rekey.
    pub fn needs_rekey(&self) -> bool {
        matches!(self, CryptoError::SequenceExhausted(_))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
