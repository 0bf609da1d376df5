//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown_signal resolves
//!
//! Shutdown (shutdown.rs):
//!     Trigger → accept loops stop → running sessions drain → exit
//! ```
//!
//! # Design Decisions
//! - Sessions are never cut short by shutdown; each ends on its own terms
//! - Accept loops subscribe to one broadcast channel

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
