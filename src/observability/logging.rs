//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Map the gateway's five log severities onto tracing levels and targets
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Access events are INFO events with target `access`, so they can be
//!   filtered independently of ordinary INFO output
//! - `RUST_LOG` takes precedence over the configured level

use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target used for access events (session start/end, rejections).
pub const ACCESS_TARGET: &str = "access";

/// Target used for lines read from a process's stderr.
pub const STDERR_TARGET: &str = "stderr";

/// Minimum severity written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Trace,
    Access,
    Info,
    Error,
    None,
}

impl LogLevel {
    /// Filter directive equivalent to this level.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::Access => "info",
            LogLevel::Info => "info,access=off",
            LogLevel::Error => "error",
            LogLevel::None => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            "access" => Ok(LogLevel::Access),
            "info" => Ok(LogLevel::Info),
            "error" => Ok(LogLevel::Error),
            "none" => Ok(LogLevel::None),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_tracing(level: LogLevel) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.directive().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
