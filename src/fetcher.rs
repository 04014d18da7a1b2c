//! Endpoint Fetcher.
//!
//! Issues one bounded `GET` per endpoint against the upstream base URL and
//! turns the response into relabeled metric families or a classified
//! failure. Every call reports duration and success to the self-metrics.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::exposition::{self, ExpositionError, MetricFamily};
use crate::labels::ExtraLabels;
use crate::metrics::ExporterMetrics;

/// One upstream exposition endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub name: String,
    pub path: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl EndpointSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            enabled: true,
        }
    }
}

/// Connection settings for the upstream source.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    /// Per-request timeout applied to every endpoint fetch.
    pub timeout: Duration,
    pub tls_insecure_skip_verify: bool,
}

/// Why an endpoint produced no metrics in this scrape.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to fetch {url}: {reason}")]
    ConnectFailure { url: String, reason: String },

    #[error("unexpected status code {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("failed to read response from {url}: {reason}")]
    ReadFailure { url: String, reason: String },

    #[error("invalid exposition from {url}: {source}")]
    MalformedExposition {
        url: String,
        #[source]
        source: ExpositionError,
    },
}

impl FetchError {
    /// Short classification used in logs and outcome reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectFailure { .. } => "connect",
            Self::UnexpectedStatus { .. } => "status",
            Self::ReadFailure { .. } => "read",
            Self::MalformedExposition { .. } => "parse",
        }
    }
}

/// Outcome of fetching one endpoint during one scrape.
#[derive(Debug)]
pub struct EndpointResult {
    pub endpoint: String,
    pub outcome: Result<Vec<MetricFamily>, FetchError>,
    pub elapsed: Duration,
}

impl EndpointResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Fetches, parses and relabels upstream endpoints.
#[derive(Clone)]
pub struct EndpointFetcher {
    client: reqwest::Client,
    base_url: String,
    labels: Arc<ExtraLabels>,
    metrics: Arc<ExporterMetrics>,
}

impl EndpointFetcher {
    pub fn new(
        settings: &UpstreamSettings,
        labels: Arc<ExtraLabels>,
        metrics: Arc<ExporterMetrics>,
    ) -> Result<Self, reqwest::Error> {
        if settings.tls_insecure_skip_verify {
            warn!("TLS certificate verification is disabled for the upstream - this is insecure and should only be used for testing");
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .no_proxy()
            .danger_accept_invalid_certs(settings.tls_insecure_skip_verify)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            labels,
            metrics,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn labels(&self) -> &ExtraLabels {
        &self.labels
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Full URL of an endpoint: base URL and path joined by exactly one `/`.
    pub fn url_for(&self, endpoint: &EndpointSpec) -> String {
        format!(
            "{}/{}",
            self.base_url,
            endpoint.path.trim_start_matches('/')
        )
    }

    /// Fetches one endpoint, giving up at `deadline` at the latest.
    pub async fn fetch(&self, endpoint: &EndpointSpec, deadline: Instant) -> EndpointResult {
        let url = self.url_for(endpoint);
        debug!(endpoint = %endpoint.name, url = %url, "Fetching metrics from endpoint");

        let start = Instant::now();
        let bounded = tokio::time::timeout_at(deadline, self.fetch_families(endpoint, &url)).await;
        let outcome = match bounded {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::ConnectFailure {
                url,
                reason: "scrape deadline exceeded".to_string(),
            }),
        };
        let elapsed = start.elapsed();

        self.metrics
            .observe_duration(&endpoint.name, elapsed.as_secs_f64());
        match &outcome {
            Ok(families) => {
                self.metrics.set_success(&endpoint.name, true);
                debug!(
                    endpoint = %endpoint.name,
                    families = families.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Endpoint scrape succeeded"
                );
            }
            Err(e) => {
                self.metrics.set_success(&endpoint.name, false);
                self.metrics.increment_errors(&endpoint.name);
                warn!(
                    endpoint = %endpoint.name,
                    kind = e.kind(),
                    "Failed to collect metrics from endpoint: {}",
                    e
                );
            }
        }

        EndpointResult {
            endpoint: endpoint.name.clone(),
            outcome,
            elapsed,
        }
    }

    async fn fetch_families(
        &self,
        endpoint: &EndpointSpec,
        url: &str,
    ) -> Result<Vec<MetricFamily>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::ConnectFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::ReadFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let parsed =
            exposition::parse_bytes(&body).map_err(|source| FetchError::MalformedExposition {
                url: url.to_string(),
                source,
            })?;

        if parsed.skipped_lines > 0 {
            warn!(
                endpoint = %endpoint.name,
                skipped = parsed.skipped_lines,
                "Dropped unparseable lines from endpoint"
            );
            self.metrics
                .record_skipped_lines(&endpoint.name, parsed.skipped_lines);
        }

        Ok(self.labels.apply(parsed.families))
    }

    /// Checks that the upstream base URL answers with a 2xx or 3xx status.
    pub async fn check_upstream(&self) -> Result<(), FetchError> {
        let url = self.base_url.clone();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::ConnectFailure {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(FetchError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BuildInfo;

    fn fetcher(base_url: &str) -> EndpointFetcher {
        let settings = UpstreamSettings {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(1),
            tls_insecure_skip_verify: false,
        };
        let metrics = Arc::new(ExporterMetrics::new(&BuildInfo::current()).unwrap());
        EndpointFetcher::new(&settings, Arc::new(ExtraLabels::default()), metrics).unwrap()
    }

    #[test]
    fn test_url_join_uses_single_slash() {
        let endpoint = EndpointSpec::new("jobs", "/metrics/jobs");
        assert_eq!(
            fetcher("http://slurm:6817").url_for(&endpoint),
            "http://slurm:6817/metrics/jobs"
        );
        assert_eq!(
            fetcher("http://slurm:6817/").url_for(&endpoint),
            "http://slurm:6817/metrics/jobs"
        );
        assert_eq!(
            fetcher("http://slurm:6817").url_for(&EndpointSpec::new("nodes", "metrics/nodes")),
            "http://slurm:6817/metrics/nodes"
        );
    }

    #[test]
    fn test_endpoint_enabled_defaults_to_true() {
        let endpoint: EndpointSpec =
            serde_yaml::from_str("name: jobs\npath: /metrics/jobs\n").unwrap();
        assert!(endpoint.enabled);
    }

    #[test]
    fn test_error_kinds() {
        let err = FetchError::UnexpectedStatus {
            url: "http://x/metrics/jobs".into(),
            status: 503,
        };
        assert_eq!(err.kind(), "status");
        assert_eq!(
            err.to_string(),
            "unexpected status code 503 from http://x/metrics/jobs"
        );
    }
}
