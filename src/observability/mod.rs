//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, access target)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr (tracing fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The tracing dispatcher is the single synchronized log sink; tests
//!   install a scoped subscriber instead of the global one
//! - Session id, url and pid travel as span fields
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
