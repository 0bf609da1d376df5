//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use wsgate::config::BridgeMode;
use wsgate::process::launcher::find_executable;
use wsgate::security::ForkLimiter;
use wsgate::{GatewayConfig, GatewayServer};

pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
pub const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

/// A gateway running on an ephemeral loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub limiter: ForkLimiter,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestGateway {
    /// Stop accepting and wait for running sessions to drain.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut self.handle).await;
    }

    /// Wait until no admission slot is held.
    pub async fn wait_idle(&self, within: Duration) {
        tokio::time::timeout(within, self.limiter.wait_idle())
            .await
        .expect("sessions did not finish in time");
    }
}

/// Config running `program` found on `PATH`.
pub fn command_config(program: &str, args: &[&str]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.process.command = Some(find_executable(program).expect("program on PATH"));
    config.process.args = args.iter().map(|a| a.to_string()).collect();
    config
}

pub fn framed(mut config: GatewayConfig) -> GatewayConfig {
    config.process.bridge = BridgeMode::Framed;
    config
}

pub async fn start_gateway(mut config: GatewayConfig) -> TestGateway {
    config.listener.addresses = vec!["127.0.0.1:0".to_string()];
    let server = GatewayServer::new(config);
    let limiter = server.state().limiter.clone();
    let listeners = server.bind().await.expect("bind gateway");
    let addr = listeners[0].local_addr().unwrap();

    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(server.run(listeners, None, async {
        let _ = rx.await;
    }));

    TestGateway {
        addr,
        limiter,
        shutdown: Some(tx),
        handle,
    }
}

/// Build a handshake request with the standard headers plus `extra`.
pub fn handshake_request(addr: SocketAddr, path: &str, extra: &[(&str, &str)]) -> String {
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {}\r\n",
        path, addr, SAMPLE_KEY
    );
    for (name, value) in extra {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    request
}

/// Send `request` on a fresh connection and read the response head.
///
/// Reads byte by byte so nothing after the head is consumed.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut byte))
            .await
            .expect("response head in time")
            .unwrap();
        assert!(n > 0, "connection closed before response head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    (stream, String::from_utf8(head).unwrap())
}

pub async fn raw_handshake(addr: SocketAddr, path: &str, extra: &[(&str, &str)]) -> (TcpStream, String) {
    send_raw(addr, handshake_request(addr, path, extra).as_bytes()).await
}

/// Value of header `name` in a response head, matched case-insensitively.
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

pub fn status_line(head: &str) -> &str {
    head.lines().next().unwrap_or("")
}

/// Read exactly `len` bytes.
pub async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("bytes in time")
        .unwrap();
    buf
}
