//! Read-only view of an inbound request for handshake decisions.
//!
//! # Responsibilities
//! - Expose the headers, method, URI, host and transport security of a request
//! - Answer token-list questions (`Connection: keep-alive, Upgrade`)
//! - Decide whether a request asks for a WebSocket upgrade
//!
//! # Design Decisions
//! - Borrowed view: built per request, dropped once the decision is made
//! - Header values that are not visible ASCII are treated as absent

use axum::http::{header, HeaderMap, Method, Request, Uri};

/// Borrowed view over the parts of a request the handshake logic reads.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeRequest<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    /// Whether the connection the request arrived on is TLS.
    pub secure: bool,
}

impl<'a> HandshakeRequest<'a> {
    pub fn new<B>(request: &'a Request<B>, secure: bool) -> Self {
        Self {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
            secure,
        }
    }

    /// First value of `name`, if present and valid ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Declared host: the `Host` header, else the URI authority.
    pub fn host(&self) -> Option<&'a str> {
        self.header(header::HOST)
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// Request path without the query.
    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    /// Path and query as sent on the request line.
    pub fn request_uri(&self) -> &'a str {
        self.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Whether this request asks to switch to the WebSocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header(header::UPGRADE)
            .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
            && header_contains_token(self.headers, header::CONNECTION, "upgrade")
    }
}

/// Whether any value of the comma-separated header `name` contains `token`,
/// compared case-insensitively.
pub fn header_contains_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}
