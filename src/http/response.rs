//! Plain-text rejection responses and response-wide headers.
//!
//! # Responsibilities
//! - Build the 403 / 429 / 404 bodies clients see before any process exists
//! - Add `X-Frame-Options: DENY` to everything except a 101
//! - Configured extra headers, also never on a 101

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tower_http::set_header::{MakeHeaderValue, SetResponseHeaderLayer};

/// A configured header that can be attached to a response.
pub type ExtraHeader = (HeaderName, HeaderValue);

/// Header value withheld from 101 responses.
#[derive(Debug, Clone)]
pub struct UnlessSwitching(HeaderValue);

impl MakeHeaderValue<Response> for UnlessSwitching {
    fn make_header_value(&mut self, response: &Response) -> Option<HeaderValue> {
        (response.status() != StatusCode::SWITCHING_PROTOCOLS).then(|| self.0.clone())
    }
}

/// Origin or fetch-metadata rejection, reason and referrer in the body.
pub fn forbidden(reason: &dyn std::fmt::Display, referer: Option<&str>) -> Response {
    (
        StatusCode::FORBIDDEN,
        format!(
            "403 FORBIDDEN: {} from referrer: {}\n",
            reason,
            referer.unwrap_or("")
        ),
    )
        .into_response()
}

/// Admission rejection.
pub fn too_many_requests() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "429 Too Many Requests\n").into_response()
}

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 Not Found\n").into_response()
}

/// Parse a `Name: value` entry. Spaces after the colon are skipped; an
/// entry without a colon is a header with an empty value.
pub fn parse_header(entry: &str) -> Result<ExtraHeader, String> {
    let (name, value) = entry.split_once(':').unwrap_or((entry, ""));
    let name = HeaderName::try_from(name.trim())
        .map_err(|e| format!("bad header name in '{}': {}", entry, e))?;
    let value = HeaderValue::try_from(value.trim_start_matches(' '))
        .map_err(|e| format!("bad header value in '{}': {}", entry, e))?;
    Ok((name, value))
}

/// Layer appending a configured header to every response except a 101.
pub fn extra_header_layer((name, value): ExtraHeader) -> SetResponseHeaderLayer<UnlessSwitching> {
    SetResponseHeaderLayer::appending(name, UnlessSwitching(value))
}

/// Append `headers` to a plain HTTP response.
pub fn with_headers(mut response: Response, headers: &[ExtraHeader]) -> Response {
    for (name, value) in headers {
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}

/// Response mapper installed on the router.
pub async fn deny_framing(mut response: Response) -> Response {
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        response
            .headers_mut()
            .insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    }
    response
}
