//! Forwards a process's stderr to the log, one event per line.

use tokio::io::{AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::observability::logging::STDERR_TARGET;
use crate::process::lines::{read_line_capped, trim_newline, MAX_LINE_BYTES};

/// Spawn the drain task in the current span. Reads until EOF so the
/// process never writes into a closed pipe; bytes need not be UTF-8.
pub fn spawn_stderr_drain<R>(stderr: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(drain(stderr).in_current_span())
}

async fn drain<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match read_line_capped(&mut reader, &mut line, MAX_LINE_BYTES).await {
            Ok(0) => {
                tracing::debug!("Process stderr closed");
                break;
            }
            Ok(_) => tracing::error!(
                target: STDERR_TARGET,
                "{}",
                String::from_utf8_lossy(trim_newline(&line))
            ),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read process stderr");
                break;
            }
        }
    }
}
