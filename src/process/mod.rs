//! Backend process subsystem.
//!
//! # Data Flow
//! ```text
//! Upgraded request
//!     → env.rs (child environment from request + filtered parent env)
//!     → launcher.rs (spawn with piped stdio)
//!     → lifecycle.rs (reaper task, escalating termination)
//!     → stderr.rs (stderr lines → log, read through lines.rs)
//! ```
//!
//! # Design Decisions
//! - A launched process belongs to exactly one lifecycle
//! - stdout goes to the bridge, stderr only ever to the log

pub mod env;
pub mod launcher;
pub mod lifecycle;
pub mod lines;
pub mod stderr;

pub use launcher::{LaunchError, LaunchedProcess, ProcessLauncher};
pub use lifecycle::{EscalationReport, LifecycleState, ProcessLifecycle, ProcessOutput};
