//! Scatter/gather packet buffer.
//!
//! A packet is a linear region with explicit headroom in front of the data,
//! followed by zero or more shared read-only fragments. Encapsulation grows
//! the headroom to prepend the header; decapsulation pulls it off again.
//! Fragments are never written: `make_writable` copies them into the linear
//! region first.

use bytes::Bytes;

/// Owned packet buffer handed to the transform engine.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    buf: Vec<u8>,
    head: usize,
    tail: usize,
    frags: Vec<Bytes>,
}

impl Packet {
    /// A linear packet with no headroom, e.g. a datagram read off the wire.
    pub fn from_wire(data: &[u8]) -> Self {
        Self::with_headroom(0, data)
    }

    /// A linear packet with `headroom` spare bytes in front of `payload`.
    pub fn with_headroom(headroom: usize, payload: &[u8]) -> Self {
        let mut buf = vec![0u8; headroom];
        buf.extend_from_slice(payload);
        Self {
            tail: buf.len(),
            buf,
            head: headroom,
            frags: Vec::new(),
        }
    }

    /// Append a shared fragment after the current data.
    pub fn add_fragment(&mut self, frag: Bytes) {
        if !frag.is_empty() {
            self.frags.push(frag);
        }
    }

    /// Total data length, linear region plus fragments.
    pub fn len(&self) -> usize {
        self.linear_len() + self.frags.iter().map(Bytes::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn linear_len(&self) -> usize {
        self.tail - self.head
    }

    pub fn headroom(&self) -> usize {
        self.head
    }

    pub fn tailroom(&self) -> usize {
        if self.frags.is_empty() {
            self.buf.len() - self.tail
        } else {
            0
        }
    }

    /// Number of scatter/gather entries needed to describe the data.
    pub fn segments(&self) -> usize {
        usize::from(self.linear_len() > 0) + self.frags.len()
    }

    pub fn is_linear(&self) -> bool {
        self.frags.is_empty()
    }

    /// The linear region. Fragment data is not included.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.head..self.tail]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..self.tail]
    }

    /// Copy up to `out.len()` leading data bytes without linearizing.
    /// Returns how many bytes were copied.
    pub fn copy_prefix(&self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        let sources = std::iter::once(self.data()).chain(self.frags.iter().map(|f| &f[..]));
        for src in sources {
            if copied == out.len() {
                break;
            }
            let n = src.len().min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&src[..n]);
            copied += n;
        }
        copied
    }

    /// Make sure `headroom` bytes can be pushed and `tailroom` bytes put,
    /// reallocating if needed. The whole buffer may not exceed `max_len`.
    pub fn ensure_room(
        &mut self,
        headroom: usize,
        tailroom: usize,
        max_len: usize,
    ) -> Result<(), PacketError> {
        let need = headroom
            .saturating_add(self.len())
            .saturating_add(tailroom);
        if need > max_len {
            return Err(PacketError::InsufficientBuffer { need, max: max_len });
        }

        if self.head >= headroom && self.tailroom() >= tailroom {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(need);
        buf.resize(headroom, 0);
        buf.extend_from_slice(self.data());
        for frag in self.frags.drain(..) {
            buf.extend_from_slice(&frag);
        }
        let tail = buf.len();
        buf.resize(tail + tailroom, 0);

        self.buf = buf;
        self.head = headroom;
        self.tail = tail;
        Ok(())
    }

    /// Copy fragments into the linear region so the whole packet is writable.
    pub fn make_writable(&mut self) {
        if self.frags.is_empty() {
            return;
        }
        self.buf.truncate(self.tail);
        for frag in self.frags.drain(..) {
            self.buf.extend_from_slice(&frag);
        }
        self.tail = self.buf.len();
    }

    /// Grow the data at the front by `n` bytes and return the new front.
    pub fn push(&mut self, n: usize) -> Result<&mut [u8], PacketError> {
        if self.head < n {
            return Err(PacketError::NoHeadroom {
                need: n,
                have: self.head,
            });
        }
        self.head -= n;
        Ok(&mut self.buf[self.head..self.head + n])
    }

    /// Drop `n` bytes from the front of the data.
    pub fn pull(&mut self, n: usize) -> Result<(), PacketError> {
        if self.linear_len() < n {
            return Err(PacketError::Underflow {
                need: n,
                have: self.linear_len(),
            });
        }
        self.head += n;
        Ok(())
    }

    /// Grow the data at the end by `n` bytes and return the new tail.
    pub fn put(&mut self, n: usize) -> Result<&mut [u8], PacketError> {
        if !self.frags.is_empty() {
            return Err(PacketError::Fragmented);
        }
        let start = self.tail;
        if self.buf.len() < start + n {
            self.buf.resize(start + n, 0);
        }
        self.tail += n;
        Ok(&mut self.buf[start..self.tail])
    }

    /// Cut the data down to `len` bytes.
    pub fn trim(&mut self, len: usize) -> Result<(), PacketError> {
        if !self.frags.is_empty() {
            return Err(PacketError::Fragmented);
        }
        if len > self.linear_len() {
            return Err(PacketError::Underflow {
                need: len,
                have: self.linear_len(),
            });
        }
        self.tail = self.head + len;
        Ok(())
    }

    /// All data bytes, fragments included.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(self.data());
        for frag in &self.frags {
            out.extend_from_slice(frag);
        }
        out
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet buffer cannot grow to {need} bytes (limit {max})")]
    InsufficientBuffer { need: usize, max: usize },

    #[error("need {need} bytes of headroom, have {have}")]
    NoHeadroom { need: usize, have: usize },

    #[error("need {need} bytes of linear data, have {have}")]
    Underflow { need: usize, have: usize },

    #[error("operation requires a linear packet")]
    Fragmented,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
