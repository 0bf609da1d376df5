//! WebSocket upgrade handshake (RFC 6455, server side).
//!
//! # Responsibilities
//! - Validate the handshake headers in a fixed order, first failure wins
//! - Compute `Sec-WebSocket-Accept`
//! - Answer `101 Switching Protocols` and take over the transport
//! - Hand back the raw byte stream; frames are not interpreted here
//!
//! # Design Decisions
//! - `Upgrader::upgrade` consumes the request: once the upgrade future is
//!   taken nothing else can answer or read through the HTTP layer
//! - The handshake timeout bounds only the time until the 101 has been
//!   written and the connection released; no deadlines are left behind
//! - Bytes the client pipelined behind its handshake are a protocol error

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

use crate::http::request::{header_contains_token, HandshakeRequest};

/// Fixed GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const BAD_HANDSHAKE: &str = "websocket: the client is not using the websocket protocol: ";

/// Any transport a bridge can run over.
pub trait RawIo: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> RawIo for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Upgraded connection as an opaque byte duplex.
pub type RawStream = Box<dyn RawIo>;

/// Rejected handshake: answered with `status` before any process exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct HandshakeError {
    pub status: StatusCode,
    pub reason: String,
    /// Echo `Sec-WebSocket-Version: 13` in the response.
    pub version_related: bool,
}

impl HandshakeError {
    fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            reason: reason.into(),
            version_related: false,
        }
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let mut response = (self.status, format!("{}\n", self.reason)).into_response();
        if self.version_related {
            response
                .headers_mut()
                .insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        }
        response
    }
}

/// Failure after the 101 was committed; the transport is closed.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("switching protocols response not written within {0:?}")]
    Timeout(Duration),

    #[error("connection takeover failed: {0}")]
    Hijack(#[source] hyper::Error),

    #[error("client sent {0} bytes before handshake was complete")]
    PipelinedData(usize),

    #[error("connection transport cannot be taken over")]
    UnsupportedTransport,
}

/// Run the ordered handshake checks and return the client key.
pub fn validate(request: &HandshakeRequest<'_>) -> Result<String, HandshakeError> {
    if !header_contains_token(request.headers, header::CONNECTION, "upgrade") {
        return Err(HandshakeError::bad_request(format!(
            "{}'upgrade' token not found in 'Connection' header",
            BAD_HANDSHAKE
        )));
    }

    if !header_contains_token(request.headers, header::UPGRADE, "websocket") {
        return Err(HandshakeError::bad_request(format!(
            "{}'websocket' token not found in 'Upgrade' header",
            BAD_HANDSHAKE
        )));
    }

    if request.method != Method::GET {
        return Err(HandshakeError {
            status: StatusCode::METHOD_NOT_ALLOWED,
            reason: format!("{}request method is not GET", BAD_HANDSHAKE),
            version_related: false,
        });
    }

    if !header_contains_token(request.headers, header::SEC_WEBSOCKET_VERSION, "13") {
        return Err(HandshakeError {
            status: StatusCode::BAD_REQUEST,
            reason: "websocket: unsupported version: 13 not found in 'Sec-Websocket-Version' header"
                .to_string(),
            version_related: true,
        });
    }

    match request.header(header::SEC_WEBSOCKET_KEY) {
        Some(key) if is_valid_challenge_key(key) => Ok(key.to_string()),
        _ => Err(HandshakeError::bad_request(
            "websocket: not a websocket handshake: 'Sec-WebSocket-Key' header must be Base64 encoded value of 16-byte in length",
        )),
    }
}

fn is_valid_challenge_key(key: &str) -> bool {
    !key.is_empty()
        && STANDARD
            .decode(key)
            .map(|raw| raw.len() == 16)
            .unwrap_or(false)
}

/// `base64(SHA-1(key ++ GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Performs the server side of the handshake.
#[derive(Debug, Clone, Copy)]
pub struct Upgrader {
    handshake_timeout: Duration,
}

impl Upgrader {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }

    /// Validate and accept the handshake, consuming the request.
    ///
    /// The returned response must be sent back to the client; the pending
    /// upgrade then resolves to the raw stream once it has been written.
    pub fn upgrade(
        &self,
        mut request: Request<Body>,
    ) -> Result<(Response, PendingUpgrade), HandshakeError> {
        let key = validate(&HandshakeRequest::new(&request, false))?;

        let on_upgrade = request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or_else(|| HandshakeError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                reason: "websocket: connection does not support upgrades".to_string(),
                version_related: false,
            })?;
        drop(request);

        let accept = HeaderValue::try_from(accept_key(&key)).map_err(|e| HandshakeError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            reason: format!("websocket: cannot encode accept key: {}", e),
            version_related: false,
        })?;

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = response.headers_mut();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);

        Ok((
            response,
            PendingUpgrade {
                on_upgrade,
                timeout: self.handshake_timeout,
            },
        ))
    }
}

/// Transport that becomes available once the 101 has been written.
#[derive(Debug)]
pub struct PendingUpgrade {
    on_upgrade: OnUpgrade,
    timeout: Duration,
}

impl PendingUpgrade {
    /// Wait for the HTTP layer to release the connection.
    pub async fn into_stream(self) -> Result<RawStream, UpgradeError> {
        let upgraded = tokio::time::timeout(self.timeout, self.on_upgrade)
            .await
            .map_err(|_| UpgradeError::Timeout(self.timeout))?
            .map_err(UpgradeError::Hijack)?;
        into_raw_stream(upgraded)
    }
}

/// Recover the underlying socket from hyper's upgraded connection.
fn into_raw_stream(upgraded: Upgraded) -> Result<RawStream, UpgradeError> {
    let upgraded = match upgraded.downcast::<TokioIo<TcpStream>>() {
        Ok(parts) => {
            ensure_no_pipelined_data(parts.read_buf.len())?;
            return Ok(Box::new(parts.io.into_inner()));
        }
        Err(upgraded) => upgraded,
    };

    match upgraded.downcast::<TokioIo<TlsStream<TcpStream>>>() {
        Ok(parts) => {
            ensure_no_pipelined_data(parts.read_buf.len())?;
            Ok(Box::new(parts.io.into_inner()))
        }
        Err(_) => Err(UpgradeError::UnsupportedTransport),
    }
}

fn ensure_no_pipelined_data(buffered: usize) -> Result<(), UpgradeError> {
    if buffered > 0 {
        return Err(UpgradeError::PipelinedData(buffered));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake() -> axum::http::request::Builder {
        Request::builder()
            .method(Method::GET)
            .uri("/")
            .header("Connection", "keep-alive, Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
    }

    fn validate_request(request: &Request<Body>) -> Result<String, HandshakeError> {
        validate(&HandshakeRequest::new(request, false))
    }

    #[test]
    fn rfc6455_accept_vector() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn valid_handshake_returns_key() {
        let request = handshake().body(Body::empty()).unwrap();
        assert_eq!(
            validate_request(&request),
            Ok("dGhlIHNhbXBsZSBub25jZQ==".to_string())
        );
    }

    #[test]
    fn first_failing_check_wins() {
        // Every check violated: Connection is reported.
        let request = Request::builder()
            .method(Method::POST)
            .header("Connection", "close")
            .header("Upgrade", "h2c")
            .header("Sec-WebSocket-Version", "8")
            .header("Sec-WebSocket-Key", "short")
            .body(Body::empty())
            .unwrap();
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.reason.contains("'Connection'"));

        // Connection fixed: Upgrade is reported.
        let request = Request::builder()
            .method(Method::POST)
            .header("Connection", "upgrade")
            .header("Upgrade", "h2c")
            .header("Sec-WebSocket-Version", "8")
            .body(Body::empty())
            .unwrap();
        let err = validate_request(&request).unwrap_err();
        assert!(err.reason.contains("'Upgrade'"));

        // Method is next, ahead of version and key.
        let request = Request::builder()
            .method(Method::POST)
            .header("Connection", "upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "8")
            .body(Body::empty())
            .unwrap();
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::METHOD_NOT_ALLOWED);

        // Version before key.
        let request = Request::builder()
            .method(Method::GET)
            .header("Connection", "upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "8")
            .body(Body::empty())
            .unwrap();
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.version_related);

        // Finally the key.
        let request = Request::builder()
            .method(Method::GET)
            .header("Connection", "upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .body(Body::empty())
            .unwrap();
        let err = validate_request(&request).unwrap_err();
        assert!(err.reason.contains("Sec-WebSocket-Key"));
        assert!(!err.version_related);
    }

    #[test]
    fn keys_not_sixteen_bytes_rejected() {
        for len in [0usize, 1, 8, 15, 17, 32] {
            let key = STANDARD.encode(vec![7u8; len]);
            let request = handshake()
                .header("Sec-WebSocket-Key", key.as_str())
                .body(Body::empty())
                .unwrap();
            // The builder appends, so drop the valid key first.
            let mut request = request;
            request
                .headers_mut()
                .insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_str(&key).unwrap());
            let err = validate_request(&request).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "length {}", len);
        }

        let mut request = handshake().body(Body::empty()).unwrap();
        request.headers_mut().insert(
            header::SEC_WEBSOCKET_KEY,
            HeaderValue::from_static("not base64 at all!!"),
        );
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn version_rejection_echoes_supported_version() {
        let mut request = handshake().body(Body::empty()).unwrap();
        request
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("8"));
        let response = validate_request(&request).unwrap_err().into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::SEC_WEBSOCKET_VERSION).unwrap(),
            "13"
        );
    }

    #[test]
    fn upgrade_builds_switching_protocols_response() {
        let mut request = handshake().body(Body::empty()).unwrap();
        let on_upgrade = hyper::upgrade::on(&mut request);
        request.extensions_mut().insert(on_upgrade);

        let upgrader = Upgrader::new(Duration::from_millis(1500));
        let (response, _pending) = upgrader.upgrade(request).unwrap();

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        let headers = response.headers();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get(header::UPGRADE).unwrap(), "websocket");
        assert_eq!(headers.get(header::CONNECTION).unwrap(), "Upgrade");
        assert_eq!(
            headers.get(header::SEC_WEBSOCKET_ACCEPT).unwrap(),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn upgrade_without_takeover_support_is_internal_error() {
        let request = handshake().body(Body::empty()).unwrap();
        let upgrader = Upgrader::new(Duration::from_millis(1500));
        let err = upgrader.upgrade(request).unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn takeover_times_out_when_response_is_not_flushed() {
        use hyper::server::conn::http1;
        use std::sync::{Arc, Mutex};
        use tokio::io::AsyncWriteExt;

        // The client never reads, so the 101 cannot be written through an
        // 8-byte pipe and the upgrade never completes.
        let (mut client, server) = tokio::io::duplex(8);
        let (pending_tx, pending_rx) = tokio::sync::oneshot::channel();
        let pending_tx = Arc::new(Mutex::new(Some(pending_tx)));
        let upgrader = Upgrader::new(Duration::from_millis(100));

        let service = hyper::service::service_fn(move |request: Request<hyper::body::Incoming>| {
            let (response, pending) = upgrader.upgrade(request.map(Body::new)).unwrap();
            if let Some(tx) = pending_tx.lock().unwrap().take() {
                let _ = tx.send(pending);
            }
            async move { Ok::<_, std::convert::Infallible>(response) }
        });
        tokio::spawn(
            http1::Builder::new()
                .serve_connection(TokioIo::new(server), service)
                .with_upgrades(),
        );
        let _client = tokio::spawn(async move {
            client
                .write_all(
                    b"GET / HTTP/1.1\r\nHost: gateway\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
                      Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
                )
                .await
                .unwrap();
            std::future::pending::<()>().await;
        });

        let pending = pending_rx.await.unwrap();
        let started = std::time::Instant::now();
        let result = pending.into_stream().await;
        assert!(matches!(result, Err(UpgradeError::Timeout(t)) if t == Duration::from_millis(100)));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
