//! Bridge subsystem: one upgraded connection coupled to one process.
//!
//! # Data Flow
//! ```text
//! PendingUpgrade (from http::upgrade)
//!     → session.rs (take over socket, launch process, logging scope)
//!     → raw.rs | framed.rs (inbound + outbound copy tasks)
//!     → lifecycle terminate → admission slot released
//! ```
//!
//! # Design Decisions
//! - Strategy chosen per deployment (`process.bridge`), both behind
//!   [`BridgeStrategy`]
//! - Inbound end terminates the process; outbound end closes the socket
//! - I/O errors are logged and treated like end-of-stream

pub mod framed;
pub mod raw;
pub mod session;

use std::sync::Arc;

use tokio::process::ChildStdout;
use tokio::task::JoinHandle;

use crate::config::BridgeMode;
use crate::http::upgrade::RawStream;
use crate::process::{EscalationReport, ProcessLifecycle};

pub use framed::FramedMessageBridge;
pub use raw::RawByteBridge;

/// What a finished bridge did.
#[derive(Debug, Clone)]
pub struct BridgeReport {
    /// Bytes delivered to the process.
    pub inbound_bytes: u64,
    /// Bytes delivered to the client.
    pub outbound_bytes: u64,
    pub escalation: EscalationReport,
}

/// Bridge selected by configuration.
#[derive(Debug, Clone, Copy)]
pub enum BridgeStrategy {
    Raw(RawByteBridge),
    Framed(FramedMessageBridge),
}

impl BridgeStrategy {
    pub fn from_mode(mode: BridgeMode) -> Self {
        match mode {
            BridgeMode::Raw => BridgeStrategy::Raw(RawByteBridge),
            BridgeMode::Framed => BridgeStrategy::Framed(FramedMessageBridge),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BridgeStrategy::Raw(_) => "raw",
            BridgeStrategy::Framed(_) => "framed",
        }
    }

    /// Couple `stream` to the process and return once both directions
    /// have finished.
    pub async fn accept(
        self,
        stream: RawStream,
        lifecycle: Arc<ProcessLifecycle>,
        stdout: ChildStdout,
    ) -> BridgeReport {
        match self {
            BridgeStrategy::Raw(bridge) => bridge.accept(stream, lifecycle, stdout).await,
            BridgeStrategy::Framed(bridge) => bridge.accept(stream, lifecycle, stdout).await,
        }
    }
}

/// Wait for both copy tasks. A panicked task counts as zero bytes; the
/// process is terminated regardless of which task got there.
pub(crate) async fn join_directions(
    inbound: JoinHandle<u64>,
    outbound: JoinHandle<u64>,
    lifecycle: &ProcessLifecycle,
) -> BridgeReport {
    let (inbound, outbound) = tokio::join!(inbound, outbound);
    let inbound_bytes = inbound.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Inbound copy task failed");
        0
    });
    let outbound_bytes = outbound.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Outbound copy task failed");
        0
    });

    BridgeReport {
        inbound_bytes,
        outbound_bytes,
        escalation: lifecycle.terminate().await,
    }
}
