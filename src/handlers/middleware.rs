//! HTTP middleware: basic authentication and request instrumentation.

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Instant;
use tracing::{debug, warn};

use crate::state::SharedState;

const AUTH_REALM: &str = "Basic realm=\"Slurm Exporter\"";

/// Rejects requests without valid basic auth credentials when enabled.
pub async fn basic_auth(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let auth = &state.config.server.basic_auth;
    if !auth.enabled {
        return next.run(req).await;
    }

    let credentials = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic_credentials);

    let authorized = match &credentials {
        Some((username, password)) => {
            // Both comparisons always run
            let user_ok = constant_time_eq(username.as_bytes(), auth.username.as_bytes());
            let pass_ok = constant_time_eq(password.as_bytes(), auth.password.as_bytes());
            user_ok & pass_ok
        }
        None => false,
    };

    if !authorized {
        warn!(
            path = %req.uri().path(),
            username = credentials.as_ref().map(|(u, _)| u.as_str()).unwrap_or(""),
            "Unauthorized access attempt"
        );
        return unauthorized();
    }

    next.run(req).await
}

/// Records request count and duration in the self-metrics and health stats.
pub async fn track_requests(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    state
        .metrics
        .record_http_request(&method, &path, status, elapsed.as_secs_f64());
    state.health_stats.record_http_request();
    state
        .health_stats
        .record_request_duration(elapsed.as_secs_f64() * 1000.0);

    debug!(
        method = %method,
        path = %path,
        status,
        duration_ms = elapsed.as_millis() as u64,
        "HTTP request served"
    );
    response
}

fn unauthorized() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM));
    response
}

/// Decodes an `Authorization: Basic <base64(user:pass)>` header value.
fn decode_basic_credentials(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    let max_len = a.len().max(b.len());

    for i in 0..max_len {
        let left = *a.get(i).unwrap_or(&0);
        let right = *b.get(i).unwrap_or(&0);
        diff |= usize::from(left ^ right);
    }

    diff == 0
}
