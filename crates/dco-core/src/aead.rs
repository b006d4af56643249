//! AEAD transform — plaintext packets to DATA_V2 wire packets and back.
//!
//! ```text
//!   encapsulate:  [ payload ]
//!             ->  [ op32 ][ pid ][ AES-GCM(payload) ][ tag ]
//!                 |<- AAD ---->|
//!
//!   IV (12) = pid (4, big-endian) || nonce tail (8)
//! ```
//!
//! The packet id is the only per-packet nonce material; the tail is a
//! per-direction secret. IV uniqueness therefore rests entirely on the
//! send generator never repeating an id within a slot.
//!
//! There is no engine-wide lock. The only shared mutable state touched here
//! is the slot's packet id generator and replay window, both of which are
//! safe for concurrent callers. Per-packet failures are logged at `trace`
//! only; callers drop the packet and never answer the peer.

use crate::crypto::{CryptoError, KeySlot};
use crate::packet::Packet;
use crate::stats::{Direction, TrafficCounters};
use crate::wire::{DataHeader, DataPrefixV2, NONCE_WIRE_SIZE, OP_SIZE_V2, TAG_SIZE};

use zerocopy::AsBytes;

/// Scatter/gather entries besides the data: AAD in front, tag behind.
const EXTRA_SEGMENTS: usize = 2;

impl KeySlot {
    /// Encrypt `pkt` in place into a DATA_V2 wire packet.
    ///
    /// On error the packet id is not reused. Limit violations leave the
    /// packet untouched; it is never partially encrypted.
    pub fn encapsulate(
        &self,
        pkt: &mut Packet,
        counters: &dyn TrafficCounters,
    ) -> Result<(), CryptoError> {
        let head_size = OP_SIZE_V2 + NONCE_WIRE_SIZE;
        // Must run before the buffer is grown, which linearizes it.
        self.check_segments(pkt.segments())?;

        pkt.ensure_room(
            self.limits.headroom() + head_size,
            TAG_SIZE,
            self.limits.max_packet_len(),
        )?;
        pkt.make_writable();

        let packet_id = self.pid_xmit.next()?;
        let payload_len = pkt.len();

        let prefix = DataPrefixV2::new(self.key_id, self.remote_peer_id, packet_id);
        let iv = self.nonce_tail_xmit.iv(prefix.packet_id);
        pkt.push(head_size)?.copy_from_slice(prefix.as_bytes());

        let (aad, payload) = pkt.data_mut().split_at_mut(head_size);
        let tag = self.encrypt.seal(&iv, aad, payload).map_err(|_| {
            tracing::trace!(key_id = self.key_id, packet_id, "encrypt failed");
            CryptoError::AuthenticationFailed
        })?;
        pkt.put(TAG_SIZE)?.copy_from_slice(&tag);

        counters.record(Direction::Tx, payload_len);
        Ok(())
    }

    /// Authenticate and decrypt a DATA_V1 or DATA_V2 wire packet in place,
    /// leaving only the plaintext payload.
    ///
    /// Replay is checked only after authentication succeeds, so a forged
    /// packet can never advance the replay window.
    pub fn decapsulate(
        &self,
        pkt: &mut Packet,
        counters: &dyn TrafficCounters,
    ) -> Result<(), CryptoError> {
        let mut op = [0u8; OP_SIZE_V2];
        let got = pkt.copy_prefix(&mut op);
        let header = DataHeader::parse(&op[..got])?;

        let need = header.min_packet_len();
        if pkt.len() < need {
            return Err(CryptoError::Truncated {
                need,
                got: pkt.len(),
            });
        }

        self.check_segments(pkt.segments())?;
        pkt.make_writable();

        let header_len = header.header_len();
        let data = pkt.data_mut();
        let (head, body) = data.split_at_mut(header_len);
        let ct_len = body.len() - TAG_SIZE;
        let (ciphertext, tag) = body.split_at_mut(ct_len);

        let mut packet_id = [0u8; NONCE_WIRE_SIZE];
        packet_id.copy_from_slice(&head[header.nonce_range()]);
        let iv = self.nonce_tail_recv.iv(packet_id);
        let aad = &head[header.aad_range()];

        self.decrypt
            .open(&iv, aad, ciphertext, tag)
            .map_err(|_| {
                tracing::trace!(key_id = self.key_id, "packet failed authentication");
                CryptoError::AuthenticationFailed
            })?;

        let packet_id = u32::from_be_bytes(packet_id);
        self.pid_recv.accept(packet_id).map_err(|e| {
            tracing::trace!(key_id = self.key_id, packet_id, error = %e, "replay rejected");
            CryptoError::ReplayRejected(e)
        })?;

        pkt.pull(header_len)?;
        pkt.trim(ct_len)?;

        counters.record(Direction::Rx, ct_len);
        Ok(())
    }

    fn check_segments(&self, data_segments: usize) -> Result<(), CryptoError> {
        let segments = data_segments + EXTRA_SEGMENTS;
        let max = self.limits.max_segments();
        if segments > max {
            return Err(CryptoError::TooManyFragments { segments, max });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
