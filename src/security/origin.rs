//! Origin and cross-site request policy.
//!
//! # Responsibilities
//! - Coarse fetch-metadata guard applied to every HTTP request
//! - Same-origin enforcement for upgrades (Origin vs Host)
//! - Allow-list enforcement for upgrades
//!
//! # Design Decisions
//! - Pure functions of (request, policy): no I/O, no logging
//! - Missing Origin is treated as `file:`, which never satisfies a restriction
//! - Any parse failure denies; nothing is allowed by default on error

use thiserror::Error;
use url::{Host, Url};

use crate::config::SecurityConfig;
use crate::http::request::HandshakeRequest;

/// Origin assumed when a request carries none.
const FALLBACK_ORIGIN: &str = "file:";

/// Reasons a request is refused by the origin policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("cannot access /index.html directly")]
    IndexAlias,

    #[error("possible cross-site access of {path}: {site}")]
    CrossSite { path: String, site: String },

    #[error("origin parsing error: {0}")]
    InvalidOrigin(String),

    #[error("request hostname parsing error: {0}")]
    InvalidHost(String),

    #[error("same origin policy violated")]
    SameOriginMismatch,

    #[error("origin list matches were not found")]
    NotAllowed,
}

/// Server-side origin restrictions for upgrade requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    same_origin: bool,
    allowed_origins: Option<Vec<String>>,
}

impl OriginPolicy {
    pub fn new(same_origin: bool, allowed_origins: Option<Vec<String>>) -> Self {
        Self {
            same_origin,
            allowed_origins,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.same_origin, config.allowed_origins.clone())
    }

    /// Origin-header checks enabled by this policy.
    pub fn check_origin(&self, request: &HandshakeRequest<'_>) -> Result<(), OriginError> {
        let origin = match request.header("origin") {
            None | Some("") => FALLBACK_ORIGIN,
            Some("null") if self.allowed_origins.is_none() => FALLBACK_ORIGIN,
            Some(value) => value,
        };
        let origin = Url::parse(origin).map_err(|e| OriginError::InvalidOrigin(e.to_string()))?;

        if !self.same_origin && self.allowed_origins.is_none() {
            return Ok(());
        }

        let origin_addr = origin_host_port(&origin);

        if self.same_origin {
            let host = request.host().unwrap_or_default();
            let local_addr = split_host_port(host, request.secure)
                .map_err(OriginError::InvalidHost)?;
            if origin_addr != local_addr {
                return Err(OriginError::SameOriginMismatch);
            }
        }

        if let Some(allowed) = &self.allowed_origins {
            if !allowed.iter().any(|pattern| matches_pattern(pattern, &origin, &origin_addr)) {
                return Err(OriginError::NotAllowed);
            }
        }

        Ok(())
    }

    pub fn same_origin(&self) -> bool {
        self.same_origin
    }

    pub fn allowed_origins(&self) -> Option<&[String]> {
        self.allowed_origins.as_deref()
    }
}

/// Cross-site guard evaluated for every HTTP request.
pub fn check_fetch_site(request: &HandshakeRequest<'_>) -> Result<(), OriginError> {
    let path = request.path();
    if path.starts_with("/index.html") {
        return Err(OriginError::IndexAlias);
    }
    // Only the bare entry pages are exempt; a query string is not.
    if matches!(request.request_uri(), "/" | "/attach") {
        return Ok(());
    }
    match request.header("sec-fetch-site") {
        None | Some("") | Some("same-origin") | Some("same-site") | Some("none") => Ok(()),
        Some(site) => Err(OriginError::CrossSite {
            path: path.to_string(),
            site: site.to_string(),
        }),
    }
}

/// (server, port) of a parsed origin, inferring the port from its scheme.
fn origin_host_port(origin: &Url) -> (String, u16) {
    let server = match origin.host() {
        Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => String::new(),
    };
    let port = origin
        .port()
        .unwrap_or(if origin.scheme() == "https" { 443 } else { 80 });
    (server, port)
}

/// Split `host[:port]`, supplying the implicit port when absent.
fn split_host_port(host: &str, secure: bool) -> Result<(String, u16), String> {
    let default_port = if secure { 443 } else { 80 };

    let (server, port) = if let Some(rest) = host.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| format!("missing ']' in address {}", host))?;
        let after = &rest[end + 1..];
        let port = match after {
            "" => None,
            _ => Some(
                after
                    .strip_prefix(':')
                    .ok_or_else(|| format!("unexpected text after ']' in address {}", host))?,
            ),
        };
        (&rest[..end], port)
    } else {
        match host.matches(':').count() {
            0 => (host, None),
            1 => {
                let (server, port) = host.split_once(':').unwrap_or((host, ""));
                (server, Some(port))
            }
            _ => return Err(format!("too many colons in address {}", host)),
        }
    };

    let port = match port {
        None => default_port,
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| format!("invalid port {:?} in address {}", port, host))?,
    };

    Ok((server.to_ascii_lowercase(), port))
}

/// Whether an allow-list entry admits the origin.
///
/// Entries with a scheme must match the origin's scheme. An entry without an
/// explicit port matches the origin on any port; an explicit port must match.
fn matches_pattern(pattern: &str, origin: &Url, origin_addr: &(String, u16)) -> bool {
    let mut rest = pattern.trim();
    if let Some(pos) = rest.find("://").filter(|&pos| pos > 0) {
        match Url::parse(rest) {
            Ok(url) if url.scheme() == origin.scheme() => {}
            _ => return false,
        }
        rest = &rest[pos + 3..];
    }
    let rest = rest.trim_end_matches('/');

    let Ok((server, port)) = split_host_port(rest, false) else {
        return false;
    };

    if port == 80 && !rest.ends_with(":80") {
        server == origin_addr.0
    } else {
        server == origin_addr.0 && port == origin_addr.1
    }
}
