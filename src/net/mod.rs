//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, per-connection task)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (id, peer, secure flag as request extension)
//!     → Hand off to HTTP layer (hyper http1 with upgrades)
//! ```
//!
//! # Design Decisions
//! - One task per accepted connection
//! - TLS is optional and handled transparently
//! - Shutdown stops accepting; upgraded sessions are not interrupted

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionId, ConnectionInfo};
pub use listener::{Listener, ListenerError};
