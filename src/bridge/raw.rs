//! Byte-for-byte bridge between the upgraded socket and process stdio.
//!
//! After the handshake nothing is interpreted: client bytes go to stdin
//! unchanged, stdout bytes go to the client unchanged.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdout;
use tokio::sync::Notify;
use tracing::Instrument;

use crate::bridge::{join_directions, BridgeReport};
use crate::http::upgrade::RawStream;
use crate::process::ProcessLifecycle;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawByteBridge;

impl RawByteBridge {
    /// Run both copy directions until each has finished.
    ///
    /// Client EOF or error ends the inbound copy, which closes stdin and
    /// terminates the process. Process EOF shuts the socket down and ends
    /// the inbound copy too.
    pub async fn accept(
        self,
        stream: RawStream,
        lifecycle: Arc<ProcessLifecycle>,
        mut stdout: ChildStdout,
    ) -> BridgeReport {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let output_done = Arc::new(Notify::new());

        let inbound = tokio::spawn(
            {
                let lifecycle = lifecycle.clone();
                let output_done = output_done.clone();
                async move {
                    let mut copied = 0;
                    if let Some(mut stdin) = lifecycle.take_stdin().await {
                        tokio::select! {
                            result = tokio::io::copy(&mut reader, &mut stdin) => match result {
                                Ok(n) => {
                                    copied = n;
                                    tracing::debug!(bytes = n, "Client closed input");
                                }
                                Err(e) => tracing::error!(error = %e, "Client to process copy failed"),
                            },
                            _ = output_done.notified() => {
                                tracing::trace!("Process output finished, dropping client input");
                            }
                        }
                    }
                    drop(reader);
                    lifecycle.terminate().await;
                    copied
                }
            }
            .in_current_span(),
        );

        let outbound = tokio::spawn(
            async move {
                let copied = match tokio::io::copy(&mut stdout, &mut writer).await {
                    Ok(n) => {
                        tracing::debug!(bytes = n, "Process closed output");
                        n
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Process to client copy failed");
                        0
                    }
                };
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!(error = %e, "Socket shutdown failed");
                }
                drop(writer);
                output_done.notify_one();
                copied
            }
            .in_current_span(),
        );

        join_directions(inbound, outbound, &lifecycle).await
    }
}
