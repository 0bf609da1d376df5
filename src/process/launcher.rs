//! Child process creation.
//!
//! # Responsibilities
//! - Resolve the configured command against `PATH`
//! - Spawn it with a constructed environment and piped stdio
//!
//! # Design Decisions
//! - The environment is replaced, not merged: children see only what
//!   `process::env` built for them
//! - The child is killed if its handle is dropped without being reaped

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::ProcessConfig;

/// Spawn failure; the upgraded transport is closed by the caller.
#[derive(Debug, Error)]
#[error("cannot start: {0}")]
pub struct LaunchError(#[source] pub std::io::Error);

/// One spawned child and its stdio handles.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub pid: u32,
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Starts the configured command once per session.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// `None` when no command is configured (static-only deployment).
    pub fn from_config(config: &ProcessConfig) -> Option<Self> {
        config
            .command
            .as_ref()
            .map(|command| Self::new(command.clone(), config.args.clone()))
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Spawn the command with `env` (`KEY=value` entries) as its whole
    /// environment.
    pub fn launch(&self, env: &[String]) -> Result<LaunchedProcess, LaunchError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .env_clear()
            .envs(env.iter().filter_map(|entry| entry.split_once('=')))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(LaunchError)?;

        let pid = child.id().ok_or_else(|| missing("pid"))?;
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        tracing::debug!(pid, command = %self.command.display(), "Process started");

        Ok(LaunchedProcess {
            pid,
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

fn missing(what: &str) -> LaunchError {
    LaunchError(std::io::Error::other(format!("child {} unavailable", what)))
}

/// Locate `program` the way a shell would: paths containing a separator are
/// taken as-is, bare names are searched in `PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
