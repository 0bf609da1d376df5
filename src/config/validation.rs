//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that something is being served at all
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, SecurityConfig};
use crate::http::response::parse_header;
use crate::observability::logging::LogLevel;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("nothing to serve: set a command or a static directory")]
    NothingToServe,

    #[error("unable to locate command '{0}' in PATH")]
    CommandNotFound(String),

    #[error("no listen address configured")]
    NoAddresses,

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("TLS requires both a certificate and a key")]
    IncompleteTls,

    #[error("handshake timeout must be greater than zero")]
    ZeroHandshakeTimeout,

    #[error("allowed origin list contains an empty entry")]
    EmptyOrigin,

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),

    #[error("invalid response header: {0}")]
    InvalidHeader(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.process.command.is_none() && config.static_files.dir.is_none() {
        errors.push(ValidationError::NothingToServe);
    }

    if config.listener.addresses.is_empty() {
        errors.push(ValidationError::NoAddresses);
    }
    for address in &config.listener.addresses {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress(address.clone()));
        }
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::IncompleteTls);
        }
    }

    if config.process.handshake_timeout_ms == 0 {
        errors.push(ValidationError::ZeroHandshakeTimeout);
    }

    if let Err(security) = validate_security(&config.security) {
        errors.extend(security);
    }

    let headers = &config.response_headers;
    for entry in headers.all.iter().chain(&headers.http) {
        if let Err(reason) = parse_header(entry) {
            errors.push(ValidationError::InvalidHeader(reason));
        }
    }

    if config.observability.log_level.parse::<LogLevel>().is_err() {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate only the reloadable security section.
pub fn validate_security(security: &SecurityConfig) -> Result<(), Vec<ValidationError>> {
    match &security.allowed_origins {
        Some(origins) if origins.iter().any(|o| o.trim().is_empty()) => {
            Err(vec![ValidationError::EmptyOrigin])
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;
    use std::path::PathBuf;

    fn serving_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.process.command = Some(PathBuf::from("/bin/cat"));
        config
    }

    #[test]
    fn default_with_command_is_valid() {
        assert_eq!(validate_config(&serving_config()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.addresses = vec!["not-an-address".into()];
        config.listener.tls = Some(TlsConfig {
            cert_path: "cert.pem".into(),
            key_path: String::new(),
        });
        config.process.handshake_timeout_ms = 0;
        config.observability.log_level = "verbose".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::NothingToServe,
                ValidationError::InvalidAddress("not-an-address".into()),
                ValidationError::IncompleteTls,
                ValidationError::ZeroHandshakeTimeout,
                ValidationError::UnknownLogLevel("verbose".into()),
            ]
        );
    }

    #[test]
    fn empty_origin_entry_rejected() {
        let mut config = serving_config();
        config.security.allowed_origins = Some(vec!["example.com".into(), " ".into()]);
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::EmptyOrigin])
        );
    }

    #[test]
    fn malformed_response_header_rejected() {
        let mut config = serving_config();
        config.response_headers.all = vec!["X-Ok: yes".into()];
        config.response_headers.http = vec!["No Spaces Allowed: x".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ValidationError::InvalidHeader(reason) if reason.contains("No Spaces Allowed")));
    }
}
