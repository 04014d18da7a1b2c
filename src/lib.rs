//! Slurm Metrics Exporter Library
//!
//! The aggregation engine behind `slurm-metrics-exporter`. It scrapes several
//! Prometheus text-exposition endpoints of an upstream Slurm exporter,
//! attaches operator-configured labels to every sample and concatenates the
//! results into a single exposition document.
//!
//! # Features
//!
//! - **Lenient parsing**: malformed sample lines are skipped and counted,
//!   only structural errors fail an endpoint
//! - **Partial failure isolation**: a failing endpoint drops its own families
//!   and nothing else
//! - **Deterministic output**: endpoint declaration order, family order and
//!   label order are preserved across scrapes
//! - **Self-metrics**: per-endpoint scrape duration, success and error counts
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use slurm_metrics_exporter::{
//!     Aggregator, BuildInfo, EndpointFetcher, EndpointSpec, ExporterMetrics, ExtraLabels,
//!     UpstreamSettings,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(ExporterMetrics::new(&BuildInfo::current())?);
//! let labels = Arc::new(ExtraLabels::new([("cluster", "c1")])?);
//! let settings = UpstreamSettings {
//!     base_url: "http://localhost:6817".to_string(),
//!     timeout: Duration::from_secs(10),
//!     tls_insecure_skip_verify: false,
//! };
//! let fetcher = EndpointFetcher::new(&settings, labels, metrics)?;
//! let aggregator = Aggregator::new(
//!     fetcher,
//!     &[EndpointSpec::new("jobs", "/metrics/jobs")],
//!     Duration::from_secs(30),
//! );
//!
//! let report = aggregator.scrape().await;
//! let mut body = Vec::new();
//! report.write_to(&mut body)?;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod exposition;
pub mod fetcher;
pub mod health_stats;
pub mod labels;
pub mod metrics;

// Re-export main types for convenience
pub use aggregator::{Aggregator, EndpointOutcome, OutcomeStatus, ScrapeReport};
pub use exposition::{ExpositionError, MetricFamily, MetricKind, Sample};
pub use fetcher::{EndpointFetcher, EndpointResult, EndpointSpec, FetchError, UpstreamSettings};
pub use health_stats::HealthStats;
pub use labels::{ExtraLabels, LabelError};
pub use metrics::{BuildInfo, ExporterMetrics};
