//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics and the state of the most recent scrape.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::sync::atomic::Ordering;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str =
    "slurm-metrics-exporter - Prometheus aggregation proxy for Slurm metrics endpoints";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let stats = &state.health_stats;
    let scraped = stats.total_scrapes.load(Ordering::Relaxed) > 0;

    // Only a scrape in which every endpoint failed marks the exporter unhealthy
    let (status, message) = if stats.last_scrape_all_failed() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "All upstream endpoints failed in the last scrape",
        )
    } else if scraped {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::OK, "OK - No scrape yet")
    };

    let uptime_hours = stats.get_uptime_seconds() as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let table = stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nUpstream: {upstream}\nUptime: {uptime_str}\n\n{table}\n{FOOTER_TEXT}\n",
            upstream = state.aggregator.fetcher().base_url()
        ),
    )
}
