//! Message-oriented bridge: WebSocket frames on the socket, lines on stdio.
//!
//! # Mapping
//! - Text or binary message from the client → message bytes + `\n` on stdin
//! - Line on stdout → one text message (binary if the line is not UTF-8);
//!   lines longer than [`MAX_LINE_BYTES`] go out in several messages
//! - Client close frame or stream end → terminate the process
//! - stdout EOF → close frame to the client

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::Instrument;

use crate::bridge::{join_directions, BridgeReport};
use crate::http::upgrade::RawStream;
use crate::process::lines::{read_line_capped, MAX_LINE_BYTES};
use crate::process::ProcessLifecycle;

#[derive(Debug, Clone, Copy, Default)]
pub struct FramedMessageBridge;

impl FramedMessageBridge {
    /// Run both directions until each has finished. Byte counts in the
    /// report are payload bytes, excluding framing and added newlines.
    pub async fn accept(
        self,
        stream: RawStream,
        lifecycle: Arc<ProcessLifecycle>,
        stdout: ChildStdout,
    ) -> BridgeReport {
        let socket = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
        let (mut sink, mut source) = socket.split();
        let output_done = Arc::new(Notify::new());

        let inbound = tokio::spawn(
            {
                let lifecycle = lifecycle.clone();
                let output_done = output_done.clone();
                async move {
                    let mut copied = 0;
                    if let Some(mut stdin) = lifecycle.take_stdin().await {
                        loop {
                            let message = tokio::select! {
                                message = source.next() => message,
                                _ = output_done.notified() => break,
                            };
                            let payload = match message {
                                Some(Ok(Message::Text(text))) => text.as_str().as_bytes().to_vec(),
                                Some(Ok(Message::Binary(data))) => data.to_vec(),
                                Some(Ok(Message::Close(frame))) => {
                                    tracing::debug!(frame = ?frame, "Client sent close");
                                    break;
                                }
                                Some(Ok(_)) => continue,
                                Some(Err(e)) => {
                                    tracing::error!(error = %e, "Failed to read message");
                                    break;
                                }
                                None => {
                                    tracing::debug!("Client closed input");
                                    break;
                                }
                            };
                            tracing::trace!(bytes = payload.len(), "Message to process");
                            if let Err(e) = write_line(&mut stdin, &payload).await {
                                tracing::debug!(error = %e, "Process stdin closed");
                                break;
                            }
                            copied += payload.len() as u64;
                        }
                    }
                    drop(source);
                    lifecycle.terminate().await;
                    copied
                }
            }
            .in_current_span(),
        );

        let outbound = tokio::spawn(
            async move {
                let mut copied = 0;
                let mut reader = BufReader::new(stdout);
                loop {
                    let mut line = Vec::new();
                    match read_line_capped(&mut reader, &mut line, MAX_LINE_BYTES).await {
                        Ok(0) => {
                            tracing::debug!("Process closed output");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to read process output");
                            break;
                        }
                    }
                    if line.last() == Some(&b'\n') {
                        line.pop();
                    }
                    copied += line.len() as u64;
                    let message = match String::from_utf8(line) {
                        Ok(text) => Message::text(text),
                        Err(e) => Message::binary(e.into_bytes()),
                    };
                    if let Err(e) = sink.send(message).await {
                        tracing::debug!(error = %e, "Failed to send message");
                        break;
                    }
                }
                if let Err(e) = sink.close().await {
                    tracing::debug!(error = %e, "Failed to send close frame");
                }
                output_done.notify_one();
                copied
            }
            .in_current_span(),
        );

        join_directions(inbound, outbound, &lifecycle).await
    }
}

async fn write_line(stdin: &mut ChildStdin, payload: &[u8]) -> std::io::Result<()> {
    stdin.write_all(payload).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::launcher::{find_executable, ProcessLauncher};
    use crate::process::lifecycle::LifecycleState;
    use std::time::Duration;

    fn start(program: &str, args: &[&str]) -> (Arc<ProcessLifecycle>, ChildStdout) {
        let launcher = ProcessLauncher::new(
            find_executable(program).unwrap(),
            args.iter().map(|a| a.to_string()).collect(),
        );
        let (lifecycle, output) =
            ProcessLifecycle::start(launcher.launch(&[]).unwrap(), Duration::ZERO);
        (Arc::new(lifecycle), output.stdout)
    }

    #[tokio::test]
    async fn messages_become_lines_and_back() {
        let (client, server) = tokio::io::duplex(4096);
        let (lifecycle, stdout) = start("cat", &[]);
        let bridge = tokio::spawn(FramedMessageBridge.accept(Box::new(server), lifecycle, stdout));

        let mut client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        client.send(Message::text("hello")).await.unwrap();
        client.send(Message::binary(b"world".to_vec())).await.unwrap();

        let first = client.next().await.unwrap().unwrap();
        let second = client.next().await.unwrap().unwrap();
        assert_eq!(first, Message::text("hello"));
        assert_eq!(second, Message::text("world"));

        client.close(None).await.unwrap();
        let report = tokio::time::timeout(Duration::from_secs(2), bridge)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.inbound_bytes, 10);
        assert_eq!(report.outbound_bytes, 10);
        assert_eq!(report.escalation.final_state, LifecycleState::Dead);
    }

    #[tokio::test]
    async fn process_exit_sends_close_frame() {
        let (client, server) = tokio::io::duplex(4096);
        let (lifecycle, stdout) = start("sh", &["-c", "printf 'a\\nb\\n'"]);
        let bridge = tokio::spawn(FramedMessageBridge.accept(Box::new(server), lifecycle, stdout));

        let mut client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let mut received = Vec::new();
        while let Some(Ok(message)) = client.next().await {
            received.push(message);
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received[0], Message::text("a"));
        assert_eq!(received[1], Message::text("b"));
        assert!(matches!(received[2], Message::Close(_)));

        let report = bridge.await.unwrap();
        assert_eq!(report.escalation.final_state, LifecycleState::Dead);
    }

    #[tokio::test]
    async fn unterminated_output_is_sent_in_capped_pieces() {
        let (client, server) = tokio::io::duplex(256 * 1024);
        let script = format!("head -c {} /dev/zero | tr '\\0' x", MAX_LINE_BYTES + 10);
        let (lifecycle, stdout) = start("sh", &["-c", &script]);
        let bridge = tokio::spawn(FramedMessageBridge.accept(Box::new(server), lifecycle, stdout));

        let mut client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let mut sizes = Vec::new();
        while let Some(Ok(message)) = client.next().await {
            if let Message::Text(text) = message {
                sizes.push(text.len());
            }
        }

        assert_eq!(sizes, vec![MAX_LINE_BYTES, 10]);
        let report = bridge.await.unwrap();
        assert_eq!(report.outbound_bytes, (MAX_LINE_BYTES + 10) as u64);
    }
}
