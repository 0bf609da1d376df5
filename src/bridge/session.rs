//! One bridged connection from socket takeover to slot release.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::bridge::BridgeStrategy;
use crate::http::upgrade::PendingUpgrade;
use crate::observability::logging::ACCESS_TARGET;
use crate::observability::metrics;
use crate::process::stderr::spawn_stderr_drain;
use crate::process::{ProcessLauncher, ProcessLifecycle};
use crate::security::AdmissionSlot;

/// Everything needed to run a session once the 101 has been sent.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub url: String,
    pub remote: SocketAddr,
    pub env: Vec<String>,
    pub launcher: ProcessLauncher,
    pub bridge: BridgeStrategy,
    pub close_grace: Duration,
}

impl Session {
    /// Logging scope for everything this session does.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "session",
            session = %self.id,
            url = %self.url,
            pid = tracing::field::Empty,
        )
    }

    /// Run on its own task. The slot is held until both bridge directions
    /// have finished, or released early on any failure.
    pub fn spawn(self, pending: PendingUpgrade, slot: AdmissionSlot) -> JoinHandle<()> {
        let span = self.span();
        tokio::spawn(self.run(pending, slot).instrument(span))
    }

    async fn run(self, pending: PendingUpgrade, slot: AdmissionSlot) {
        let stream = match pending.into_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(remote = %self.remote, error = %e, "Upgrade failed");
                return;
            }
        };

        let process = match self.launcher.launch(&self.env) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(
                    remote = %self.remote,
                    command = %self.launcher.command().display(),
                    error = %e,
                    "Failed to launch process"
                );
                return;
            }
        };

        let pid = process.pid;
        Span::current().record("pid", pid);
        let started = Instant::now();
        metrics::record_session_started();
        tracing::info!(
            target: ACCESS_TARGET,
            remote = %self.remote,
            command = %self.launcher.command().display(),
            bridge = self.bridge.name(),
            "Session started"
        );

        let (lifecycle, output) = ProcessLifecycle::start(process, self.close_grace);
        spawn_stderr_drain(output.stderr);
        let report = self
            .bridge
            .accept(stream, Arc::new(lifecycle), output.stdout)
            .await;

        metrics::record_session_finished(started);
        tracing::info!(
            target: ACCESS_TARGET,
            remote = %self.remote,
            final_state = report.escalation.final_state.as_str(),
            inbound_bytes = report.inbound_bytes,
            outbound_bytes = report.outbound_bytes,
            duration_ms = started.elapsed().as_millis() as u64,
            "Session ended"
        );
        slot.release();
    }
}
