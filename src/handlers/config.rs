//! Configuration display endpoint handler.
//!
//! This module provides the `/config` endpoint handler that displays
//! the effective exporter configuration. The basic auth password is never shown.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::config::duration_str::format_duration;
use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");

    let cfg = state.config.redacted();
    let mut out = String::new();

    writeln!(out, "SLURM METRICS EXPORTER - CONFIGURATION").ok();
    writeln!(out, "======================================").ok();
    writeln!(out).ok();

    writeln!(out, "SERVER CONFIGURATION").ok();
    writeln!(out, "--------------------").ok();
    writeln!(out, "bind:                       {}", cfg.server.bind).ok();
    writeln!(out, "port:                       {}", cfg.server.port).ok();
    writeln!(
        out,
        "scrape_timeout:             {}",
        format_duration(cfg.server.scrape_timeout)
    )
    .ok();
    writeln!(
        out,
        "basic_auth:                 {}",
        if cfg.server.basic_auth.enabled {
            format!(
                "enabled (user '{}', password {})",
                cfg.server.basic_auth.username, cfg.server.basic_auth.password
            )
        } else {
            "disabled".to_string()
        }
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "TLS/SSL CONFIGURATION").ok();
    writeln!(out, "---------------------").ok();
    writeln!(out, "enabled:                    {}", cfg.server.tls.enabled).ok();
    writeln!(
        out,
        "cert_file:                  {}",
        cfg.server.tls.cert_file.as_deref().unwrap_or("none")
    )
    .ok();
    writeln!(
        out,
        "key_file:                   {}",
        cfg.server.tls.key_file.as_deref().unwrap_or("none")
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "UPSTREAM").ok();
    writeln!(out, "--------").ok();
    writeln!(out, "url:                        {}", cfg.upstream.url).ok();
    writeln!(
        out,
        "timeout:                    {}",
        format_duration(cfg.upstream.timeout)
    )
    .ok();
    writeln!(
        out,
        "tls_insecure_skip_verify:   {}",
        cfg.upstream.tls_insecure_skip_verify
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "ENDPOINTS").ok();
    writeln!(out, "---------").ok();
    for endpoint in &cfg.endpoints {
        writeln!(
            out,
            "{:27} {} ({})",
            format!("{}:", endpoint.name),
            endpoint.path,
            if endpoint.enabled { "enabled" } else { "disabled" }
        )
        .ok();
    }
    writeln!(out).ok();

    writeln!(out, "EXTRA LABELS").ok();
    writeln!(out, "------------").ok();
    if cfg.labels.is_empty() {
        writeln!(out, "none").ok();
    }
    for (key, value) in &cfg.labels {
        writeln!(out, "{:27} {}", format!("{}:", key), value).ok();
    }
    writeln!(out).ok();

    writeln!(out, "LOGGING").ok();
    writeln!(out, "-------").ok();
    writeln!(out, "level:                      {}", cfg.logging.level).ok();
    writeln!(out, "format:                     {}", cfg.logging.format).ok();
    writeln!(out).ok();

    writeln!(out, "{}", FOOTER_TEXT).ok();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        out,
    )
}
