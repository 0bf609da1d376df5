//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            command-line flags
//!     → loader.rs (parse)           → cli.rs (clap, overlay onto file)
//!                   ↘              ↙
//!                  validation.rs (semantic checks)
//!                       → GatewayConfig (validated, immutable)
//!                       → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the active origin policy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the security section hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    BridgeMode, GatewayConfig, ListenerConfig, ObservabilityConfig, ProcessConfig,
    ResponseHeadersConfig, SecurityConfig, StaticConfig, TlsConfig,
};
