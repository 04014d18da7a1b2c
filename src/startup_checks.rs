//! Startup requirement validation for slurm-metrics-exporter.
//!
//! Verifies that the upstream Slurm exporter is reachable before serving.
//! A failing check is reported but never stops the exporter.

use slurm_metrics_exporter::EndpointFetcher;
use tracing::{error, info};

/// Probe the upstream base URL once.
pub async fn validate_upstream(fetcher: &EndpointFetcher) -> Result<(), ValidationError> {
    info!("🔍 Checking upstream at {}...", fetcher.base_url());

    match fetcher.check_upstream().await {
        Ok(()) => {
            info!("✅ Upstream reachable: {}", fetcher.base_url());
            Ok(())
        }
        Err(e) => {
            error!("❌ Upstream health check failed: {}", e);
            error!("   Check upstream.url and that the Slurm exporter is running");
            Err(ValidationError::UpstreamUnreachable(e.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),
}
