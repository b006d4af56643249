//! Packet ids — send-side generator and receive-side replay window.
//!
//! The packet id is the only nonce material on the wire, so the sender must
//! never repeat one within a key slot. It starts at 1 and stops hard once the
//! 32-bit space is used up; the control plane is expected to rekey long
//! before that (a warning is logged at `PKTID_WRAP_WARN`).
//!
//! The receive side keeps a sliding bitmap of recently accepted ids and
//! rejects duplicates and ids that have fallen behind the window.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Past this id the sender logs that a rekey is overdue.
pub const PKTID_WRAP_WARN: u32 = 0xF000_0000;

/// Number of ids tracked behind the highest accepted id.
pub const REPLAY_WINDOW_SIZE: u32 = 2048;

const WINDOW_WORDS: usize = (REPLAY_WINDOW_SIZE / 64) as usize;

/// First id handed out by a fresh generator.
const FIRST_PACKET_ID: u64 = 1;

/// One past the last usable id.
const PKTID_EXHAUSTED: u64 = u32::MAX as u64 + 1;

// ── Transmit ──────────────────────────────────────────────────────────────────

/// Lock-free monotonic packet id generator.
///
/// Concurrent callers always get distinct ids; the set handed out is
/// contiguous.
#[derive(Debug)]
pub struct PacketIdXmit {
    next: AtomicU64,
}

impl Default for PacketIdXmit {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketIdXmit {
    pub fn new() -> Self {
        Self::starting_at(FIRST_PACKET_ID)
    }

    pub(crate) fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Claim the next packet id.
    pub fn next(&self) -> Result<u32, SequenceExhausted> {
        let id = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < PKTID_EXHAUSTED).then_some(n + 1)
            })
            .map_err(|_| SequenceExhausted)?;

        if id == u64::from(PKTID_WRAP_WARN) {
            tracing::warn!(packet_id = id, "packet id nearing wrap, rekey required");
        }
        Ok(id as u32)
    }

    /// Ids still available before exhaustion.
    pub fn remaining(&self) -> u64 {
        PKTID_EXHAUSTED.saturating_sub(self.next.load(Ordering::Relaxed))
    }
}

// ── Replay Window ─────────────────────────────────────────────────────────────

/// Sliding-window replay protection (RFC 6479 style).
///
/// Tracks the highest accepted id and a bitmap of the `REPLAY_WINDOW_SIZE`
/// ids at and below it. Bit `d` of the bitmap stands for `highest - d`.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    highest: u32,
    bitmap: [u64; WINDOW_WORDS],
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self {
            highest: 0,
            bitmap: [0u64; WINDOW_WORDS],
        }
    }

    pub fn highest(&self) -> u32 {
        self.highest
    }

    /// Would `id` be accepted right now?
    pub fn check(&self, id: u32) -> Result<(), ReplayError> {
        if id == 0 {
            return Err(ReplayError::Zero);
        }
        if id > self.highest {
            return Ok(());
        }
        let diff = self.highest - id;
        if diff >= REPLAY_WINDOW_SIZE {
            return Err(ReplayError::OutOfWindow {
                id,
                highest: self.highest,
            });
        }
        let (word, bit) = Self::position(diff);
        if self.bitmap[word] & (1u64 << bit) != 0 {
            return Err(ReplayError::Duplicate(id));
        }
        Ok(())
    }

    /// Record `id` as received. Call only after `check` passed.
    pub fn mark(&mut self, id: u32) {
        if id > self.highest {
            self.shift_window(id - self.highest);
            self.highest = id;
        }
        let diff = self.highest - id;
        if diff < REPLAY_WINDOW_SIZE {
            let (word, bit) = Self::position(diff);
            self.bitmap[word] |= 1u64 << bit;
        }
    }

    fn position(diff: u32) -> (usize, u32) {
        ((diff / 64) as usize, diff % 64)
    }

    // Moves every recorded id `shift` positions further from the head.
    fn shift_window(&mut self, shift: u32) {
        if shift >= REPLAY_WINDOW_SIZE {
            self.bitmap.fill(0);
            return;
        }
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        if word_shift > 0 {
            self.bitmap.rotate_right(word_shift);
            self.bitmap[..word_shift].fill(0);
        }
        if bit_shift > 0 {
            for i in (1..WINDOW_WORDS).rev() {
                self.bitmap[i] =
                    (self.bitmap[i] << bit_shift) | (self.bitmap[i - 1] >> (64 - bit_shift));
            }
            self.bitmap[0] <<= bit_shift;
        }
    }
}

// ── Receive ───────────────────────────────────────────────────────────────────

/// Shared receive-side replay state for one key slot.
///
/// Check and mark happen under one lock, so two callers racing with the same
/// id can never both be accepted.
#[derive(Debug, Default)]
pub struct PacketIdRecv {
    window: Mutex<ReplayWindow>,
}

impl PacketIdRecv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `id` exactly once.
    pub fn accept(&self, id: u32) -> Result<(), ReplayError> {
        let mut window = self.window.lock();
        window.check(id)?;
        window.mark(id);
        Ok(())
    }

    pub fn highest(&self) -> u32 {
        self.window.lock().highest()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("packet id space exhausted, rekey required")]
pub struct SequenceExhausted;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("packet id {0} already received")]
    Duplicate(u32),

    #[error("packet id {id} is behind the replay window (highest {highest})")]
    OutOfWindow { id: u32, highest: u32 },

    #[error("packet id 0 is never valid")]
    Zero,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
