//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind addresses, TLS).
    pub listener: ListenerConfig,

    /// Backend process settings.
    pub process: ProcessConfig,

    /// Origin and cross-site policy.
    pub security: SecurityConfig,

    /// Static content served for non-upgrade requests.
    pub static_files: StaticConfig,

    /// Extra response headers.
    pub response_headers: ResponseHeadersConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Whether the listener terminates TLS.
    pub fn tls_enabled(&self) -> bool {
        self.listener.tls.is_some()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind addresses (e.g., "0.0.0.0:8080", "[::1]:8080").
    pub addresses: Vec<String>,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["0.0.0.0:8080".to_string()],
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// How the upgraded connection is coupled to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Opaque byte pass-through after the handshake.
    #[default]
    Raw,
    /// WebSocket messages in, stdout lines out.
    Framed,
}

impl std::str::FromStr for BridgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(BridgeMode::Raw),
            "framed" => Ok(BridgeMode::Framed),
            other => Err(format!("unknown bridge mode '{}'", other)),
        }
    }
}

/// Backend process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Program launched for every upgraded connection.
    pub command: Option<PathBuf>,

    /// Arguments passed to the program.
    pub args: Vec<String>,

    /// Extra grace added to each termination window, in milliseconds.
    pub close_grace_ms: u64,

    /// Time allowed to write the 101 response, in milliseconds.
    pub handshake_timeout_ms: u64,

    /// Maximum concurrently running processes (0 = unlimited).
    pub max_forks: usize,

    /// Parent environment variables passed through to the process.
    pub pass_env: Vec<String>,

    /// Bridge strategy used after the handshake.
    pub bridge: BridgeMode,
}

impl ProcessConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            close_grace_ms: 0,
            handshake_timeout_ms: 1500,
            max_forks: 0,
            pass_env: default_pass_env(),
            bridge: BridgeMode::Raw,
        }
    }
}

/// Platform default for the pass-through environment list.
pub fn default_pass_env() -> Vec<String> {
    let names: &[&str] = if cfg!(target_os = "macos") {
        &["PATH", "DYLD_LIBRARY_PATH"]
    } else if cfg!(windows) {
        &["PATH", "SystemRoot", "COMSPEC", "PATHEXT", "WINDIR"]
    } else {
        &["PATH", "LD_LIBRARY_PATH"]
    };
    names.iter().map(|n| n.to_string()).collect()
}

/// Origin policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Reject upgrades whose Origin differs from the Host.
    pub same_origin: bool,

    /// Origins allowed to upgrade. `None` disables the list check.
    pub allowed_origins: Option<Vec<String>>,
}

/// Static content configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StaticConfig {
    /// Directory served for plain HTTP requests.
    pub dir: Option<PathBuf>,
}

/// Extra response headers, each written as `Name: value`.
///
/// Neither list is applied to the 101 response, which carries only the
/// handshake headers.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResponseHeadersConfig {
    /// Added to every HTTP response, rejections included.
    pub all: Vec<String>,

    /// Added to plain HTTP responses: static files and 404.
    pub http: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, trace, access, info, error, none).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "access".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
