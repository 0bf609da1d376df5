//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[source] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid config: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read and parse a TOML file without semantic validation.
///
/// The CLI overlays flags onto the parsed file before validating the result.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("wsgate-{}-{}.toml", name, std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_valid_file() {
        let path = temp_file(
            "valid",
            r#"
            [process]
            command = "/bin/cat"
            [security]
            same_origin = true
            "#,
        );
        let config = load_config(&path).unwrap();
        assert!(config.security.same_origin);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn rejects_invalid_file() {
        let path = temp_file("invalid", "[process]\nhandshake_timeout_ms = 0\n");
        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
        let _ = fs::remove_file(path);
    }

    #[test]
    fn validation_errors_are_listed_together() {
        let err = ConfigError::Validation(vec![
            ValidationError::NothingToServe,
            ValidationError::NothingToServe,
        ]);
        let message = err.to_string();
        assert!(message.starts_with("invalid config: "));
        assert_eq!(message.matches(", ").count(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("wsgate-does-not-exist.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
    }
}
