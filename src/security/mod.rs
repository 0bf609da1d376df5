//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → origin.rs (fetch-metadata guard, every request)
//!     → [upgrade requests only]
//!         → origin.rs (same-origin / allow-list)
//!         → fork_limit.rs (admission slot or 429)
//!     → Pass to upgrader
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Every rejection happens before a process exists

pub mod fork_limit;
pub mod origin;

pub use fork_limit::{AdmissionSlot, ForkLimiter};
pub use origin::{OriginError, OriginPolicy};
