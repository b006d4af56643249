//! Remote bindings: where a peer's packets go right now.
//!
//! A binding is built from a raw socket address handed over by the transport
//! or control plane, validated once, and never mutated afterwards. Replacing
//! it is the peer's job (see `Peer::reset_binding`).

use std::fmt;
use std::mem::size_of;
use std::net::SocketAddr;

use socket2::SockAddr;

/// A validated IPv4 or IPv6 transport address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBinding {
    addr: SocketAddr,
}

impl RemoteBinding {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Build a binding from a raw socket address.
    ///
    /// The family is checked before anything else. Only the bytes that make
    /// up a `sockaddr_in` / `sockaddr_in6` are interpreted; a shorter
    /// structure is rejected rather than over-read.
    pub fn from_sockaddr(sa: &SockAddr) -> Result<Self, BindError> {
        let family = libc::c_int::from(sa.family());
        let expected = match family {
            libc::AF_INET => size_of::<libc::sockaddr_in>(),
            libc::AF_INET6 => size_of::<libc::sockaddr_in6>(),
            other => return Err(BindError::UnsupportedFamily(other)),
        };

        let len = sa.len() as usize;
        if len < expected {
            return Err(BindError::InvalidAddress {
                family,
                len,
                expected,
            });
        }

        let addr = sa.as_socket().ok_or(BindError::InvalidAddress {
            family,
            len,
            expected,
        })?;
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }
}

impl From<SocketAddr> for RemoteBinding {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for RemoteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("unsupported address family {0}")]
    UnsupportedFamily(libc::c_int),

    #[error("address of family {family} is {len} bytes, need {expected}")]
    InvalidAddress {
        family: libc::c_int,
        len: usize,
        expected: usize,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
