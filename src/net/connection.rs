//! Per-connection identity.
//!
//! # Responsibilities
//! - Number accepted connections for log correlation
//! - Carry peer address and transport security to request handlers

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Only uniqueness matters, so relaxed ordering is enough.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, shown as `conn-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Request extension describing the connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    /// TLS terminated by this gateway.
    pub secure: bool,
}

impl ConnectionInfo {
    pub fn new(peer: SocketAddr, secure: bool) -> Self {
        Self {
            id: ConnectionId::next(),
            peer,
            secure,
        }
    }
}
