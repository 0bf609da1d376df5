//! wsgate: expose a stdio program over WebSocket.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                        WSGATE                         │
//!                       │                                                       │
//!   Client request      │  ┌─────────┐   ┌──────────┐   ┌──────────────────┐   │
//!   ────────────────────┼─▶│   net   │──▶│   http   │──▶│ security         │   │
//!                       │  │listener │   │  server  │   │ origin + forks   │   │
//!                       │  └─────────┘   └────┬─────┘   └────────┬─────────┘   │
//!                       │                     │ static           │ upgrade     │
//!                       │                     ▼                  ▼             │
//!                       │               ┌──────────┐      ┌─────────────┐      │
//!                       │               │ ServeDir │      │   bridge    │      │
//!                       │               └──────────┘      │  session    │      │
//!                       │                                 └──────┬──────┘      │
//!                       │                                        ▼             │
//!   Raw bytes / frames  │                                 ┌─────────────┐      │
//!   ◀───────────────────┼─────────────────────────────────│   process   │◀─────┼── child stdio
//!                       │                                 │ lifecycle   │      │
//!                       │                                 └─────────────┘      │
//!                       │  ┌─────────┐ ┌───────────────┐ ┌───────────┐         │
//!                       │  │ config  │ │ observability │ │ lifecycle │         │
//!                       │  └─────────┘ └───────────────┘ └───────────┘         │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use wsgate::config::cli::Cli;
use wsgate::config::watcher::ConfigWatcher;
use wsgate::http::GatewayServer;
use wsgate::lifecycle::signals::shutdown_signal;
use wsgate::observability::logging::{init_tracing, LogLevel};
use wsgate::observability::metrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wsgate: {}", e);
            std::process::exit(1);
        }
    };

    let level = config
        .observability
        .log_level
        .parse::<LogLevel>()
        .unwrap_or(LogLevel::Access);
    init_tracing(level);

    tracing::info!("wsgate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        addresses = ?config.listener.addresses,
        tls = config.tls_enabled(),
        command = ?config.process.command,
        max_forks = config.process.max_forks,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher stops when dropped, so it lives until shutdown.
    let (_watcher, config_updates) = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(watcher) => (Some(watcher), Some(updates)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to watch config file, hot reload disabled");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let server = GatewayServer::new(config);
    let listeners = server.bind().await?;
    server.run(listeners, config_updates, shutdown_signal()).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
