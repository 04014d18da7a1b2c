//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and used by the CLI subcommands.

use slurm_metrics_exporter::{
    Aggregator, BuildInfo, EndpointFetcher, ExporterMetrics, HealthStats,
};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub config: Arc<Config>,
    pub aggregator: Aggregator,
    pub metrics: Arc<ExporterMetrics>,
    pub health_stats: Arc<HealthStats>,
    pub build_info: BuildInfo,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Builds the engine from a validated configuration.
    pub fn from_config(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let build_info = BuildInfo::current();
        let metrics = Arc::new(ExporterMetrics::new(&build_info)?);
        let labels = Arc::new(config.extra_labels()?);
        let fetcher = EndpointFetcher::new(&config.upstream_settings(), labels, metrics.clone())?;
        let aggregator = Aggregator::new(fetcher, &config.endpoints, config.server.scrape_timeout);

        Ok(Self {
            config: Arc::new(config),
            aggregator,
            metrics,
            health_stats: Arc::new(HealthStats::new()),
            build_info,
            start_time: Instant::now(),
        })
    }
}
