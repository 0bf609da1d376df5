//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (net::listener, hyper http1 with upgrades)
//!     → server.rs (router, fetch-metadata guard, dispatch)
//!     → request.rs (read-only handshake view)
//!     → upgrade.rs (validate, 101, take over the socket)
//!     → response.rs (plain-text rejections, frame options)
//!     → bridge::session (after the 101 is written)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;

pub use request::HandshakeRequest;
pub use server::{AppState, GatewayServer, ServerError};
pub use upgrade::{HandshakeError, PendingUpgrade, RawStream, UpgradeError, Upgrader};
