//! dco wire format — the data-channel packet header.
//!
//! These constants ARE the protocol. Deployed endpoints depend on every bit
//! width below; changing one is a breaking change.
//!
//! Current (DATA_V2) packet:
//!
//! ```text
//!   [ op32 (4) ][ packet id (4) ][ ciphertext ... ][ tag (16) ]
//!   |<------- AAD (8) -------->|
//! ```
//!
//! Legacy (DATA_V1) packet:
//!
//! ```text
//!   [ op8 (1) ][ packet id (4) ][ ciphertext ... ][ tag (16) ]
//!              |<- AAD (4) ->|
//! ```
//!
//! The first byte always carries the opcode in its top five bits and the key
//! id in its low three. DATA_V2 extends the op to a big-endian 32-bit word
//! whose low 24 bits are the remote peer id. All multi-byte fields are
//! big-endian. There is no unsafe code in this module.

use std::ops::Range;

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Op encoding ──────────────────────────────────────────────────────────────

/// Legacy data packet: 1-byte op, no peer id.
pub const DATA_V1: u8 = 6;

/// Current data packet: 4-byte op carrying key id and peer id.
pub const DATA_V2: u8 = 9;

pub const OPCODE_SHIFT: u8 = 3;
pub const KEY_ID_MASK: u8 = 0x07;

/// Largest key id that fits the op byte.
pub const KEY_ID_MAX: u8 = KEY_ID_MASK;

/// Largest peer id that fits the DATA_V2 op word.
pub const PEER_ID_MAX: u32 = 0x00FF_FFFF;

pub const OP_SIZE_V1: usize = 1;
pub const OP_SIZE_V2: usize = 4;

// ── Nonce and tag ────────────────────────────────────────────────────────────

/// Bytes of nonce material transmitted per packet (the packet id).
pub const NONCE_WIRE_SIZE: usize = 4;

/// Full AEAD IV size. The cipher must accept exactly this.
pub const NONCE_SIZE: usize = 12;

/// Per-direction salt appended to the wire nonce to form the IV.
/// Pre-shared by the control plane, never transmitted.
pub const NONCE_TAIL_SIZE: usize = NONCE_SIZE - NONCE_WIRE_SIZE;

/// AEAD authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Bytes added to a plaintext packet by encapsulation (always DATA_V2).
pub const ENCAP_OVERHEAD: usize = OP_SIZE_V2 + NONCE_WIRE_SIZE + TAG_SIZE;

/// Opcode from the first byte of a packet.
pub fn opcode_extract(first: u8) -> u8 {
    first >> OPCODE_SHIFT
}

/// Key id from the first byte of a packet.
pub fn key_id_extract(first: u8) -> u8 {
    first & KEY_ID_MASK
}

/// Compose the 32-bit DATA_V2 op word. Out-of-range fields are masked.
pub fn op32_compose(opcode: u8, key_id: u8, peer_id: u32) -> u32 {
    let op8 = ((opcode << OPCODE_SHIFT) | (key_id & KEY_ID_MASK)) as u32;
    (op8 << 24) | (peer_id & PEER_ID_MAX)
}

// ── DATA_V2 prefix ───────────────────────────────────────────────────────────

/// The eight header bytes in front of a DATA_V2 ciphertext.
///
/// This whole struct is the additional authenticated data of the packet.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct DataPrefixV2 {
    /// Big-endian op word: opcode, key id, peer id.
    pub op: [u8; 4],
    /// Big-endian packet id. Doubles as the first four IV bytes.
    pub packet_id: [u8; 4],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(DataPrefixV2, [u8; OP_SIZE_V2 + NONCE_WIRE_SIZE]);

impl DataPrefixV2 {
    pub fn new(key_id: u8, peer_id: u32, packet_id: u32) -> Self {
        Self {
            op: op32_compose(DATA_V2, key_id, peer_id).to_be_bytes(),
            packet_id: packet_id.to_be_bytes(),
        }
    }

    pub fn op(&self) -> u32 {
        u32::from_be_bytes(self.op)
    }

    pub fn packet_id(&self) -> u32 {
        u32::from_be_bytes(self.packet_id)
    }
}

// ── Parsed header ────────────────────────────────────────────────────────────

/// A data-packet header, resolved once from the opcode.
///
/// Everything that differs between the two variants (op length, AAD span,
/// packet id offset) is answered here so the transform code never branches
/// on raw opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataHeader {
    /// Legacy header. The op byte sits outside the authenticated region.
    V1 { key_id: u8 },
    /// Current header. Op word and packet id are both authenticated.
    V2 { key_id: u8, peer_id: u32 },
}

impl DataHeader {
    /// Parse the op bytes at the front of `packet`.
    ///
    /// Only the op itself is inspected; total length is checked by the caller
    /// against `header_len() + TAG_SIZE`.
    pub fn parse(packet: &[u8]) -> Result<Self, WireError> {
        let first = *packet.first().ok_or(WireError::Truncated {
            need: OP_SIZE_V1,
            got: 0,
        })?;

        match opcode_extract(first) {
            DATA_V2 => {
                let op: [u8; OP_SIZE_V2] = packet
                    .get(..OP_SIZE_V2)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(WireError::Truncated {
                        need: OP_SIZE_V2,
                        got: packet.len(),
                    })?;
                Ok(DataHeader::V2 {
                    key_id: key_id_extract(first),
                    peer_id: u32::from_be_bytes(op) & PEER_ID_MAX,
                })
            }
            DATA_V1 => Ok(DataHeader::V1 {
                key_id: key_id_extract(first),
            }),
            other => Err(WireError::UnsupportedOpcode(other)),
        }
    }

    pub fn op_size(&self) -> usize {
        match self {
            DataHeader::V1 { .. } => OP_SIZE_V1,
            DataHeader::V2 { .. } => OP_SIZE_V2,
        }
    }

    /// Op bytes plus the wire nonce.
    pub fn header_len(&self) -> usize {
        self.op_size() + NONCE_WIRE_SIZE
    }

    /// Smallest well-formed packet for this header (empty payload).
    pub fn min_packet_len(&self) -> usize {
        self.header_len() + TAG_SIZE
    }

    pub fn key_id(&self) -> u8 {
        match *self {
            DataHeader::V1 { key_id } | DataHeader::V2 { key_id, .. } => key_id,
        }
    }

    /// Remote peer id, present only in DATA_V2.
    pub fn peer_id(&self) -> Option<u32> {
        match *self {
            DataHeader::V1 { .. } => None,
            DataHeader::V2 { peer_id, .. } => Some(peer_id),
        }
    }

    /// Byte range of the packet id inside the packet.
    pub fn nonce_range(&self) -> Range<usize> {
        self.op_size()..self.header_len()
    }

    /// Byte range authenticated as AAD.
    pub fn aad_range(&self) -> Range<usize> {
        match self {
            DataHeader::V1 { .. } => self.nonce_range(),
            DataHeader::V2 { .. } => 0..self.header_len(),
        }
    }

    /// Read the big-endian packet id. `None` if `packet` is too short.
    pub fn packet_id(&self, packet: &[u8]) -> Option<u32> {
        let bytes: [u8; NONCE_WIRE_SIZE] = packet.get(self.nonce_range())?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Write op bytes and packet id into the front of `buf`.
    pub fn write(&self, buf: &mut [u8], packet_id: u32) -> Result<(), WireError> {
        let need = self.header_len();
        if buf.len() < need {
            return Err(WireError::Truncated {
                need,
                got: buf.len(),
            });
        }
        match *self {
            DataHeader::V1 { key_id } => {
                buf[0] = (DATA_V1 << OPCODE_SHIFT) | (key_id & KEY_ID_MASK);
                buf[OP_SIZE_V1..need].copy_from_slice(&packet_id.to_be_bytes());
            }
            DataHeader::V2 { key_id, peer_id } => {
                let prefix = DataPrefixV2::new(key_id, peer_id, packet_id);
                buf[..need].copy_from_slice(prefix.as_bytes());
            }
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unsupported opcode: {0}")]
    UnsupportedOpcode(u8),

    #[error("packet truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
