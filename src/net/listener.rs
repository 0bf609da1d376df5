//! TCP listener and per-connection HTTP/1.1 serving.
//!
//! # Responsibilities
//! - Bind to a configured address
//! - Accept incoming TCP connections, optionally terminating TLS
//! - Serve each connection with upgrade support, tagging requests with
//!   their [`ConnectionInfo`]
//! - Stop accepting on shutdown; connections already accepted run on
//!
//! # Design Decisions
//! - HTTP/1.1 only: the WebSocket handshake is an HTTP/1.1 upgrade
//! - The connection's io type is passed to hyper unwrapped so an upgraded
//!   connection can be recovered as the original socket
//! - No automatic `Date` header: the 101 carries exactly the handshake headers

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

use crate::net::connection::ConnectionInfo;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(String, std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bound listener, plain or TLS.
pub struct Listener {
    inner: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind to `address`.
    pub async fn bind(address: &str, tls: Option<TlsAcceptor>) -> Result<Self, ListenerError> {
        let addr: SocketAddr = address.parse().map_err(|e| {
            ListenerError::Bind(
                address.to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            )
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ListenerError::Bind(address.to_string(), e))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ListenerError::Bind(address.to_string(), e))?;

        tracing::info!(address = %local_addr, tls = tls.is_some(), "Listener bound");

        Ok(Self {
            inner: listener,
            tls,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept and serve connections until `shutdown` fires.
    pub async fn serve(self, app: Router, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %ListenerError::Accept(e), "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
                _ = shutdown.recv() => break,
            };

            let info = ConnectionInfo::new(peer, self.tls.is_some());
            tracing::debug!(connection = %info.id, peer = %peer, "Connection accepted");

            let app = app.clone();
            let tls = self.tls.clone();
            tokio::spawn(async move {
                match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => serve_connection(TokioIo::new(stream), app, info).await,
                        Err(e) => {
                            tracing::debug!(connection = %info.id, error = %e, "TLS handshake failed")
                        }
                    },
                    None => serve_connection(TokioIo::new(stream), app, info).await,
                }
            });
        }

        if let Ok(addr) = self.inner.local_addr() {
            tracing::info!(address = %addr, "Listener stopped accepting");
        }
    }
}

async fn serve_connection<I>(io: TokioIo<I>, app: Router, info: ConnectionInfo)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = app.map_request(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(info);
        request
    });

    let result = http1::Builder::new()
        .timer(TokioTimer::new())
        .title_case_headers(true)
        .auto_date_header(false)
        .serve_connection(io, TowerToHyperService::new(service))
        .with_upgrades()
        .await;

    match result {
        Ok(()) => tracing::trace!(connection = %info.id, "Connection closed"),
        Err(e) => tracing::debug!(connection = %info.id, error = %e, "Connection error"),
    }
}
