//! Command-line flags layered over the file configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::{BridgeMode, GatewayConfig, TlsConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::process::launcher::find_executable;

#[derive(Debug, Parser)]
#[command(name = "wsgate")]
#[command(about = "Expose a stdio program over WebSocket", long_about = None)]
pub struct Cli {
    /// TOML configuration file; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HTTP port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Interfaces to bind to (e.g. 127.0.0.1 or [::1]). Repeatable.
    #[arg(long)]
    pub address: Vec<String>,

    /// Max concurrent processes, zero means unlimited.
    #[arg(long)]
    pub maxforks: Option<usize>,

    /// Extra milliseconds added to every termination window.
    #[arg(long)]
    pub closems: Option<u64>,

    /// Restrict upgrades if origin and host headers differ.
    #[arg(long)]
    pub sameorigin: bool,

    /// Restrict upgrades if origin does not match the comma-separated list.
    #[arg(long)]
    pub origin: Option<String>,

    /// Use TLS on the listening socket.
    #[arg(long, requires_all = ["sslcert", "sslkey"])]
    pub ssl: bool,

    /// Certificate PEM file used with --ssl.
    #[arg(long, requires = "ssl")]
    pub sslcert: Option<String>,

    /// Private key PEM file used with --ssl.
    #[arg(long, requires = "ssl")]
    pub sslkey: Option<String>,

    /// Serve static content from this directory over HTTP.
    #[arg(long)]
    pub staticdir: Option<PathBuf>,

    /// Comma-separated environment variables passed to processes.
    #[arg(long)]
    pub passenv: Option<String>,

    /// Custom header for every response but the upgrade, as "Name: value". Repeatable.
    #[arg(long)]
    pub header: Vec<String>,

    /// Custom header for plain HTTP responses only, as "Name: value". Repeatable.
    #[arg(long)]
    pub header_http: Vec<String>,

    /// Bridge strategy: raw or framed.
    #[arg(long)]
    pub bridge: Option<BridgeMode>,

    /// Log level: debug, trace, access, info, error, none.
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Program to run for each connection, followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Build the effective configuration: file (if any), then flags, then validation.
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => GatewayConfig::default(),
        };

        if self.ssl {
            config.listener.tls = Some(TlsConfig {
                cert_path: self.sslcert.clone().unwrap_or_default(),
                key_path: self.sslkey.clone().unwrap_or_default(),
            });
        }

        let default_port = if config.tls_enabled() { 443 } else { 80 };
        if !self.address.is_empty() {
            let port = self.port.unwrap_or(default_port);
            config.listener.addresses = self
                .address
                .iter()
                .map(|address| format!("{}:{}", address, port))
                .collect();
        } else if let Some(port) = self.port {
            config.listener.addresses = vec![format!("0.0.0.0:{}", port)];
        } else if self.config.is_none() {
            config.listener.addresses = vec![format!("0.0.0.0:{}", default_port)];
        }

        if let Some(max_forks) = self.maxforks {
            config.process.max_forks = max_forks;
        }
        if let Some(close_ms) = self.closems {
            config.process.close_grace_ms = close_ms;
        }
        if let Some(list) = &self.passenv {
            config.process.pass_env = split_list(list);
        }
        if let Some(bridge) = self.bridge {
            config.process.bridge = bridge;
        }

        if self.sameorigin {
            config.security.same_origin = true;
        }
        if let Some(list) = &self.origin {
            config.security.allowed_origins = Some(split_list(list));
        }

        if let Some(dir) = self.staticdir {
            config.static_files.dir = Some(dir);
        }
        config.response_headers.all.extend(self.header);
        config.response_headers.http.extend(self.header_http);
        if let Some(level) = self.loglevel {
            config.observability.log_level = level;
        }

        if let Some((program, args)) = self.command.split_first() {
            match find_executable(program) {
                Some(path) => {
                    config.process.command = Some(path);
                    config.process.args = args.to_vec();
                }
                None => {
                    return Err(ConfigError::Validation(vec![
                        ValidationError::CommandNotFound(program.clone()),
                    ]));
                }
            }
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("wsgate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_build_config() {
        let config = parse(&[
            "--port",
            "9000",
            "--address",
            "127.0.0.1",
            "--maxforks",
            "3",
            "--closems",
            "50",
            "--origin",
            "example.com, https://other.org",
            "--bridge",
            "framed",
            "sh",
            "-c",
            "cat",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.listener.addresses, vec!["127.0.0.1:9000".to_string()]);
        assert_eq!(config.process.max_forks, 3);
        assert_eq!(config.process.close_grace_ms, 50);
        assert_eq!(config.process.bridge, BridgeMode::Framed);
        assert_eq!(config.process.args, vec!["-c".to_string(), "cat".to_string()]);
        assert_eq!(
            config.security.allowed_origins,
            Some(vec!["example.com".to_string(), "https://other.org".to_string()])
        );
    }

    #[test]
    fn header_flags_are_collected() {
        let config = parse(&[
            "--header",
            "X-One: 1",
            "--header",
            "X-Two: 2",
            "--header-http",
            "Cache-Control: max-age=60",
            "cat",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.response_headers.all, vec!["X-One: 1".to_string(), "X-Two: 2".to_string()]);
        assert_eq!(config.response_headers.http, vec!["Cache-Control: max-age=60".to_string()]);
    }

    #[test]
    fn default_port_without_config_file() {
        let config = parse(&["cat"]).into_config().unwrap();
        assert_eq!(config.listener.addresses, vec!["0.0.0.0:80".to_string()]);
    }

    #[test]
    fn ssl_requires_key_material() {
        let parsed = Cli::try_parse_from(["wsgate", "--ssl", "cat"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_command_rejected() {
        let result = parse(&["definitely-not-a-real-program-wsgate"]).into_config();
        assert!(matches!(
            result,
            Err(ConfigError::Validation(ref errors))
                if errors == &vec![ValidationError::CommandNotFound(
                    "definitely-not-a-real-program-wsgate".into()
                )]
        ));
    }
}
