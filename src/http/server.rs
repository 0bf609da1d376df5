//! Gateway server: request dispatch and listener orchestration.
//!
//! # Responsibilities
//! - Build the Axum router around one catch-all handler
//! - Guard every request with the fetch-metadata check
//! - Upgrade requests: origin policy → admission → handshake → session
//! - Everything else: static files when configured, else 404
//! - Run the accept loops, apply origin-policy reloads, drain on shutdown
//!
//! # Design Decisions
//! - Every rejection is answered before any process exists
//! - The admission slot moves into the session task with the upgrade, so
//!   it is released on every exit path of that task
//! - The origin policy is swapped atomically on reload; in-flight checks
//!   keep the policy they loaded

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tower::{Layer, ServiceExt};
use tower_http::{
    services::ServeDir,
    set_header::{SetResponseHeader, SetResponseHeaderLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::bridge::session::Session;
use crate::bridge::BridgeStrategy;
use crate::config::GatewayConfig;
use crate::http::request::HandshakeRequest;
use crate::http::response::{self, ExtraHeader};
use crate::http::upgrade::Upgrader;
use crate::lifecycle::shutdown::{drain_sessions, Shutdown};
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::load_tls_acceptor;
use crate::net::ConnectionInfo;
use crate::observability::logging::ACCESS_TARGET;
use crate::observability::metrics;
use crate::process::env::build_env;
use crate::process::ProcessLauncher;
use crate::security::origin::check_fetch_site;
use crate::security::{ForkLimiter, OriginPolicy};

/// Static file service with `Cache-Control: no-cache`.
pub type StaticFiles = SetResponseHeader<ServeDir, HeaderValue>;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<ArcSwap<OriginPolicy>>,
    pub limiter: ForkLimiter,
    pub upgrader: Upgrader,
    /// `None` when only static files are served.
    pub launcher: Option<ProcessLauncher>,
    pub bridge: BridgeStrategy,
    pub close_grace: Duration,
    pub pass_env: Arc<[String]>,
    pub static_files: Option<StaticFiles>,
    /// Headers for plain HTTP responses only.
    pub http_headers: Arc<[ExtraHeader]>,
}

impl AppState {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            policy: Arc::new(ArcSwap::from_pointee(OriginPolicy::from_config(&config.security))),
            limiter: ForkLimiter::new(config.process.max_forks),
            upgrader: Upgrader::new(config.process.handshake_timeout()),
            launcher: ProcessLauncher::from_config(&config.process),
            bridge: BridgeStrategy::from_mode(config.process.bridge),
            close_grace: config.process.close_grace(),
            pass_env: config.process.pass_env.clone().into(),
            static_files: config.static_files.dir.as_deref().map(static_files),
            http_headers: parse_headers(&config.response_headers.http).into(),
        }
    }
}

/// Headers that fail to parse were already reported by validation.
fn parse_headers(entries: &[String]) -> Vec<ExtraHeader> {
    entries
        .iter()
        .filter_map(|entry| match response::parse_header(entry) {
            Ok(header) => Some(header),
            Err(reason) => {
                tracing::warn!(%reason, "Ignoring response header");
                None
            }
        })
        .collect()
}

fn static_files(dir: &Path) -> StaticFiles {
    SetResponseHeaderLayer::overriding(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
        .layer(ServeDir::new(dir))
}

/// Server startup failure.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("TLS setup failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// The gateway: configuration plus shared request state.
pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Self {
        let state = AppState::from_config(&config);
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .fallback(gateway_handler)
            .with_state(self.state.clone())
            .layer(middleware::map_response(response::deny_framing));
        for header in parse_headers(&self.config.response_headers.all) {
            router = router.layer(response::extra_header_layer(header));
        }
        router.layer(TraceLayer::new_for_http())
    }

    /// Bind every configured address, loading TLS material first.
    pub async fn bind(&self) -> Result<Vec<Listener>, ServerError> {
        let tls = match &self.config.listener.tls {
            Some(tls) => Some(
                load_tls_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                    .await
                    .map_err(ServerError::Tls)?,
            ),
            None => None,
        };

        let mut listeners = Vec::with_capacity(self.config.listener.addresses.len());
        for address in &self.config.listener.addresses {
            listeners.push(Listener::bind(address, tls.clone()).await?);
        }
        Ok(listeners)
    }

    /// Serve until `shutdown_signal` resolves, then wait for running
    /// sessions to finish.
    pub async fn run<F>(
        self,
        listeners: Vec<Listener>,
        config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        shutdown_signal: F,
    ) where
        F: Future<Output = ()>,
    {
        let shutdown = Shutdown::new();
        let app = self.router();

        let loops: Vec<_> = listeners
            .into_iter()
            .map(|listener| tokio::spawn(listener.serve(app.clone(), shutdown.subscribe())))
            .collect();

        if let Some(mut updates) = config_updates {
            let policy = self.state.policy.clone();
            tokio::spawn(async move {
                while let Some(config) = updates.recv().await {
                    policy.store(Arc::new(OriginPolicy::from_config(&config.security)));
                    tracing::info!(
                        same_origin = config.security.same_origin,
                        allowed_origins = ?config.security.allowed_origins,
                        "Origin policy reloaded"
                    );
                }
            });
        }

        tracing::info!(
            bridge = self.state.bridge.name(),
            max_forks = self.state.limiter.max_forks(),
            "Gateway running"
        );

        shutdown_signal.await;
        shutdown.trigger();
        for accept_loop in loops {
            if let Err(e) = accept_loop.await {
                tracing::error!(error = %e, "Accept loop failed");
            }
        }

        drain_sessions(&self.state.limiter).await;
        tracing::info!("Gateway stopped");
    }
}

/// Single entry point for every request.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let connection = request.extensions().get::<ConnectionInfo>().copied();
    let secure = connection.map(|c| c.secure).unwrap_or(false);
    let remote = connection
        .map(|c| c.peer)
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));

    let view = HandshakeRequest::new(&request, secure);
    if let Err(e) = check_fetch_site(&view) {
        tracing::info!(
            target: ACCESS_TARGET,
            remote = %remote,
            path = view.path(),
            reason = %e,
            "Request forbidden"
        );
        return response::forbidden(&e, view.header(header::REFERER));
    }

    let upgrade = view.is_websocket_upgrade();
    match state.launcher.clone() {
        Some(launcher) if upgrade => upgrade_handler(state, launcher, request, remote, secure),
        _ => response::with_headers(serve_static(&state, request).await, &state.http_headers),
    }
}

fn upgrade_handler(
    state: AppState,
    launcher: ProcessLauncher,
    request: Request<Body>,
    remote: SocketAddr,
    secure: bool,
) -> Response {
    let view = HandshakeRequest::new(&request, secure);

    if let Err(e) = state.policy.load().check_origin(&view) {
        metrics::record_rejection("origin");
        tracing::info!(
            target: ACCESS_TARGET,
            remote = %remote,
            origin = view.header(header::ORIGIN).unwrap_or(""),
            reason = %e,
            "Upgrade forbidden"
        );
        return response::forbidden(&e, view.header(header::REFERER));
    }

    let Some(slot) = state.limiter.try_acquire() else {
        metrics::record_rejection("fork_limit");
        tracing::info!(
            target: ACCESS_TARGET,
            remote = %remote,
            max_forks = state.limiter.max_forks(),
            "Fork limit reached"
        );
        return response::too_many_requests();
    };

    let url = request.uri().to_string();
    let env = build_env(&state.pass_env, &view, remote);

    let (response, pending) = match state.upgrader.upgrade(request) {
        Ok(accepted) => accepted,
        Err(e) => {
            metrics::record_rejection("handshake");
            tracing::info!(
                target: ACCESS_TARGET,
                remote = %remote,
                status = e.status.as_u16(),
                reason = %e,
                "Handshake rejected"
            );
            return e.into_response();
        }
    };

    Session {
        id: Uuid::new_v4(),
        url,
        remote,
        env,
        launcher,
        bridge: state.bridge,
        close_grace: state.close_grace,
    }
    .spawn(pending, slot);

    response
}

async fn serve_static(state: &AppState, request: Request<Body>) -> Response {
    let Some(files) = state.static_files.clone() else {
        return response::not_found();
    };
    match files.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
