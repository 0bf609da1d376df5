//! Graceful termination of a child process.
//!
//! # States
//! ```text
//! Running → StdinClosed → Interrupted → Terminated → Killed
//!    └──────────┴─────────────┴─────────────┴──────────┴──→ Dead (process exited)
//! ```
//!
//! # Escalation
//! Termination walks [`ESCALATION_LADDER`] one step at a time: perform the
//! step's action, then wait up to its window for the process to exit. An
//! exit during any window ends the walk. Windows marked `graced` are
//! extended by the configured close grace.
//!
//! # Design Decisions
//! - One reaper task owns the `Child` and publishes the exit on a watch
//!   channel; it is started at launch and shared by every window
//! - Force-kill goes through the reaper, which is the only holder of the
//!   child handle
//! - `terminate` runs the ladder at most once per process; later or
//!   concurrent callers get the same report
//! - Failed signal deliveries are logged and escalation continues

use std::process::ExitStatus;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, watch, Mutex, OnceCell};

use crate::observability::metrics;
use crate::process::launcher::LaunchedProcess;

/// Escalation state of one process. Only ever moves forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Running = 0,
    StdinClosed = 1,
    Interrupted = 2,
    Terminated = 3,
    Killed = 4,
    Dead = 5,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            1 => LifecycleState::StdinClosed,
            2 => LifecycleState::Interrupted,
            3 => LifecycleState::Terminated,
            4 => LifecycleState::Killed,
            5 => LifecycleState::Dead,
            _ => LifecycleState::Running,
        }
    }
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Running => "running",
            LifecycleState::StdinClosed => "stdin_closed",
            LifecycleState::Interrupted => "interrupted",
            LifecycleState::Terminated => "terminated",
            LifecycleState::Killed => "killed",
            LifecycleState::Dead => "dead",
        }
    }
}

/// What one escalation step does to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    CloseStdin,
    Interrupt,
    Terminate,
    Kill,
}

/// One rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationStep {
    pub action: EscalationAction,
    pub window: Duration,
    /// Whether the configured close grace extends this window.
    pub graced: bool,
    /// State entered when the window elapses without an exit.
    pub on_timeout: LifecycleState,
}

impl EscalationStep {
    const fn new(
        action: EscalationAction,
        window_ms: u64,
        graced: bool,
        on_timeout: LifecycleState,
    ) -> Self {
        Self {
            action,
            window: Duration::from_millis(window_ms),
            graced,
            on_timeout,
        }
    }
}

#[cfg(unix)]
pub const ESCALATION_LADDER: &[EscalationStep] = &[
    EscalationStep::new(EscalationAction::CloseStdin, 100, true, LifecycleState::StdinClosed),
    EscalationStep::new(EscalationAction::Interrupt, 250, true, LifecycleState::Interrupted),
    EscalationStep::new(EscalationAction::Terminate, 500, true, LifecycleState::Terminated),
    EscalationStep::new(EscalationAction::Kill, 1000, false, LifecycleState::Killed),
];

/// Without interrupt/terminate signals the ladder goes straight to kill.
#[cfg(not(unix))]
pub const ESCALATION_LADDER: &[EscalationStep] = &[
    EscalationStep::new(EscalationAction::CloseStdin, 100, true, LifecycleState::StdinClosed),
    EscalationStep::new(EscalationAction::Kill, 1000, false, LifecycleState::Killed),
];

/// Exit as observed by the reaper task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    /// `None` when the status could not be collected.
    Exited(Option<ExitStatus>),
}

impl ExitState {
    pub fn is_exited(&self) -> bool {
        matches!(self, ExitState::Exited(_))
    }
}

/// Outcome of one `terminate` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationReport {
    pub final_state: LifecycleState,
    /// Actions performed, in order.
    pub actions: Vec<EscalationAction>,
    pub elapsed: Duration,
}

/// Process output handles, handed to the bridge and the stderr drain.
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Owns one launched process until it has been reaped.
#[derive(Debug)]
pub struct ProcessLifecycle {
    pid: u32,
    grace: Duration,
    ladder: Vec<EscalationStep>,
    state: AtomicU8,
    stdin: Mutex<Option<ChildStdin>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    exit_rx: watch::Receiver<ExitState>,
    report: OnceCell<EscalationReport>,
}

impl ProcessLifecycle {
    /// Take ownership of `process` and start its reaper task.
    pub fn start(process: LaunchedProcess, grace: Duration) -> (Self, ProcessOutput) {
        Self::with_ladder(process, grace, ESCALATION_LADDER.to_vec())
    }

    pub fn with_ladder(
        process: LaunchedProcess,
        grace: Duration,
        ladder: Vec<EscalationStep>,
    ) -> (Self, ProcessOutput) {
        let LaunchedProcess {
            pid,
            child,
            stdin,
            stdout,
            stderr,
        } = process;

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(ExitState::Running);
        tokio::spawn(reap(child, pid, kill_rx, exit_tx));

        let lifecycle = Self {
            pid,
            grace,
            ladder,
            state: AtomicU8::new(LifecycleState::Running as u8),
            stdin: Mutex::new(Some(stdin)),
            kill_tx: Mutex::new(Some(kill_tx)),
            exit_rx,
            report: OnceCell::new(),
        };
        (lifecycle, ProcessOutput { stdout, stderr })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current state; `Dead` as soon as the exit has been observed.
    pub fn state(&self) -> LifecycleState {
        if self.exit_rx.borrow().is_exited() {
            return LifecycleState::Dead;
        }
        LifecycleState::from(self.state.load(Ordering::SeqCst))
    }

    /// Exit status, once the process has exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match *self.exit_rx.borrow() {
            ExitState::Exited(status) => status,
            ExitState::Running => None,
        }
    }

    /// Hand the process's stdin to a writer. Returns `None` once taken or
    /// closed by escalation.
    pub async fn take_stdin(&self) -> Option<ChildStdin> {
        self.stdin.lock().await.take()
    }

    /// Wait for the process to exit, without escalating.
    pub async fn wait(&self) -> ExitState {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(ExitState::is_exited).await {
            Ok(exit) => *exit,
            Err(_) => ExitState::Exited(None),
        };
        exit
    }

    /// Drive the process to exit. Runs the ladder once; repeated calls wait
    /// for and return the first run's report.
    pub async fn terminate(&self) -> EscalationReport {
        self.report.get_or_init(|| self.escalate()).await.clone()
    }

    async fn escalate(&self) -> EscalationReport {
        let started = Instant::now();
        let mut actions = Vec::new();
        let mut exit_rx = self.exit_rx.clone();

        tracing::debug!(pid = self.pid, "Terminating process");

        for step in &self.ladder {
            if exit_rx.borrow().is_exited() {
                break;
            }

            actions.push(step.action);
            self.apply(step.action).await;

            let window = if step.graced {
                step.window + self.grace
            } else {
                step.window
            };
            let exited = tokio::time::timeout(window, exit_rx.wait_for(ExitState::is_exited))
                .await
                .is_ok();
            if exited {
                break;
            }

            self.advance(step.on_timeout);
            tracing::debug!(
                pid = self.pid,
                state = step.on_timeout.as_str(),
                window_ms = window.as_millis() as u64,
                "Process still running after escalation window"
            );
        }

        let final_state = self.state();
        if final_state == LifecycleState::Dead {
            self.advance(LifecycleState::Dead);
            tracing::debug!(
                pid = self.pid,
                status = ?self.exit_status(),
                "Process exited"
            );
        } else {
            tracing::error!(
                pid = self.pid,
                state = final_state.as_str(),
                "Process did not exit after escalation, giving up"
            );
        }
        metrics::record_escalation(final_state.as_str());

        EscalationReport {
            final_state,
            actions,
            elapsed: started.elapsed(),
        }
    }

    async fn apply(&self, action: EscalationAction) {
        match action {
            EscalationAction::CloseStdin => {
                if self.stdin.lock().await.take().is_some() {
                    tracing::trace!(pid = self.pid, "Closed process stdin");
                }
            }
            EscalationAction::Interrupt => self.signal(action),
            EscalationAction::Terminate => self.signal(action),
            EscalationAction::Kill => match self.kill_tx.lock().await.take().map(|tx| tx.send(())) {
                Some(Ok(())) => {
                    tracing::debug!(pid = self.pid, "Sent kill");
                }
                _ => tracing::error!(pid = self.pid, "Cannot kill process: reaper has stopped"),
            },
        }
    }

    #[cfg(unix)]
    fn signal(&self, action: EscalationAction) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let signal = match action {
            EscalationAction::Interrupt => Signal::SIGINT,
            EscalationAction::Terminate => Signal::SIGTERM,
            _ => return,
        };
        let result = i32::try_from(self.pid)
            .map_err(|_| nix::Error::ESRCH)
            .and_then(|pid| kill(Pid::from_raw(pid), signal));
        match result {
            Ok(()) => tracing::debug!(pid = self.pid, signal = %signal, "Sent signal"),
            Err(e) => tracing::error!(pid = self.pid, signal = %signal, error = %e, "Failed to send signal"),
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, action: EscalationAction) {
        tracing::debug!(pid = self.pid, action = ?action, "Signal not supported on this platform");
    }

    fn advance(&self, to: LifecycleState) {
        self.state.fetch_max(to as u8, Ordering::SeqCst);
    }
}

/// Sole owner of the child handle: waits for exit, or kills on request.
async fn reap(
    mut child: Child,
    pid: u32,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<ExitState>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::error!(pid, error = %e, "Failed to kill process");
            }
            child.wait().await
        }
    };

    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::error!(pid, error = %e, "Failed to collect process exit status");
            None
        }
    };
    exit_tx.send_replace(ExitState::Exited(status));
}
