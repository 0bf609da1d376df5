//! Environment handed to each child process.
//!
//! The list is built once per session from the request metadata and a
//! filtered copy of the gateway's own environment. Entries are `KEY=value`
//! strings in a stable order: pass-through variables first, then request
//! variables, then one `HTTP_*` entry per request header.

use std::net::SocketAddr;

use crate::http::request::HandshakeRequest;

/// Value of `SERVER_SOFTWARE`.
pub const SERVER_SOFTWARE: &str = concat!("wsgate/", env!("CARGO_PKG_VERSION"));

/// Build the child environment, reading pass-through values from the
/// gateway's own environment.
pub fn build_env(pass_env: &[String], request: &HandshakeRequest<'_>, peer: SocketAddr) -> Vec<String> {
    let parent = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    build_env_from(parent, pass_env, request, peer)
}

/// Same as [`build_env`] with an explicit parent environment.
pub fn build_env_from<I>(
    parent: I,
    pass_env: &[String],
    request: &HandshakeRequest<'_>,
    peer: SocketAddr,
) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env = Vec::new();

    for (name, value) in parent {
        // HTTPS is only ever set from the connection's own TLS state.
        if name == "HTTPS" || !pass_env.iter().any(|p| p == &name) {
            continue;
        }
        let value = clean(&value);
        if !value.is_empty() {
            env.push(format!("{}={}", name, value));
        }
    }

    let uri = request.uri;
    push(&mut env, "QUERY_STRING", uri.query().unwrap_or(""));
    push(&mut env, "REQUEST_URI", request.request_uri());
    push(&mut env, "REMOTE_ADDR", &peer.ip().to_string());
    push(&mut env, "REMOTE_PORT", &peer.port().to_string());
    push(&mut env, "SERVER_SOFTWARE", SERVER_SOFTWARE);
    if request.secure {
        push(&mut env, "HTTPS", "on");
    }

    for name in request.headers.keys() {
        let values: Vec<String> = request
            .headers
            .get_all(name)
            .iter()
            .map(|v| clean(&String::from_utf8_lossy(v.as_bytes())))
            .collect();
        let key = format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_"));
        env.push(format!("{}={}", key, values.join(", ")));
    }

    env
}

fn push(env: &mut Vec<String>, key: &str, value: &str) {
    env.push(format!("{}={}", key, clean(value)));
}

/// Newlines become spaces so one entry never spans lines.
fn clean(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn parent() -> Vec<(String, String)> {
        vec![
            ("PATH".into(), "/usr/bin:/bin".into()),
            ("SECRET".into(), "hunter2".into()),
            ("HTTPS".into(), "on".into()),
            ("EMPTY".into(), "  ".into()),
            ("MULTI".into(), "a\nb".into()),
        ]
    }

    fn pass() -> Vec<String> {
        ["PATH", "HTTPS", "EMPTY", "MULTI"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn filters_parent_environment() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let view = HandshakeRequest::new(&request, false);
        let env = build_env_from(parent(), &pass(), &view, "127.0.0.1:5000".parse().unwrap());

        assert!(env.contains(&"PATH=/usr/bin:/bin".to_string()));
        assert!(env.contains(&"MULTI=a b".to_string()));
        assert!(!env.iter().any(|e| e.starts_with("SECRET=")));
        assert!(!env.iter().any(|e| e.starts_with("EMPTY=")));
        assert!(!env.iter().any(|e| e.starts_with("HTTPS=")));
    }

    #[test]
    fn request_metadata_and_headers() {
        let request = Request::builder()
            .uri("/chat?room=1&x=y")
            .header("Host", "a.example")
            .header("X-Custom-Thing", "one")
            .header("X-Custom-Thing", " two ")
            .body(Body::empty())
            .unwrap();
        let view = HandshakeRequest::new(&request, true);
        let env = build_env_from(Vec::new(), &[], &view, "[::1]:4242".parse().unwrap());

        assert_eq!(
            &env[..6],
            &[
                "QUERY_STRING=room=1&x=y".to_string(),
                "REQUEST_URI=/chat?room=1&x=y".to_string(),
                "REMOTE_ADDR=::1".to_string(),
                "REMOTE_PORT=4242".to_string(),
                format!("SERVER_SOFTWARE={}", SERVER_SOFTWARE),
                "HTTPS=on".to_string(),
            ]
        );
        assert!(env.contains(&"HTTP_HOST=a.example".to_string()));
        assert!(env.contains(&"HTTP_X_CUSTOM_THING=one, two".to_string()));
    }
}
