//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler. Every request runs
//! one scrape of all enabled upstream endpoints, writes the merged families
//! and appends the exporter's own metrics.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Initial buffer capacity for the merged exposition.
const BUFFER_CAP: usize = 256 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
///
/// Answers `200` whenever the scrape ran, even if every endpoint failed.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    let report = state.aggregator.scrape().await;
    let scrape_seconds = start.elapsed().as_secs_f64();
    state.health_stats.record_scrape(&report, scrape_seconds);

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    if let Err(e) = report.write_to(&mut buffer) {
        error!("Failed to write merged exposition: {}", e);
        state.health_stats.record_encoding_error();
        return Err(MetricsError::EncodingFailed);
    }
    if let Err(e) = state.metrics.encode(&mut buffer) {
        error!("Failed to encode exporter metrics: {}", e);
        state.health_stats.record_encoding_error();
        return Err(MetricsError::EncodingFailed);
    }

    let response_size_kb = buffer.len() as f64 / 1024.0;
    state
        .health_stats
        .record_metrics_response_size_kb(response_size_kb);
    state.health_stats.record_metrics_endpoint_call();

    debug!(
        "Metrics request completed: {} families, {} failed endpoints, {} bytes, {:.3}ms",
        report.families.len(),
        report.failed_endpoints(),
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok((
        [(header::CONTENT_TYPE, state.metrics.content_type())],
        buffer,
    ))
}
