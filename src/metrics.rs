//! Exporter self-metrics.
//!
//! Every `ExporterMetrics` owns its own prometheus `Registry`, so several
//! instances (one per test, for example) never collide on registration.
//! The engine only calls additive or idempotent operations on it.

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Version metadata exported as `slurm_exporter_build_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub git_commit: String,
    pub build_time: String,
}

impl BuildInfo {
    /// Build metadata captured by vergen at compile time.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: option_env!("VERGEN_GIT_SHA")
                .unwrap_or("unknown")
                .to_string(),
            build_time: option_env!("VERGEN_BUILD_TIMESTAMP")
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Collection of the exporter's own Prometheus metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    pub build_info: GaugeVec,               // labels: version, git_commit, build_time
    pub scrape_duration_seconds: HistogramVec, // labels: endpoint
    pub scrape_success: GaugeVec,           // labels: endpoint
    pub scrape_errors_total: CounterVec,    // labels: endpoint
    pub scrape_skipped_lines_total: CounterVec, // labels: endpoint
    pub http_requests_total: CounterVec,    // labels: method, path, status
    pub http_request_duration_seconds: HistogramVec, // labels: method, path
}

impl ExporterMetrics {
    /// Creates a fresh registry and registers all self-metrics with it.
    pub fn new(build: &BuildInfo) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let build_info = GaugeVec::new(
            Opts::new(
                "slurm_exporter_build_info",
                "A metric with a constant '1' value labeled by version, git_commit, and build_time",
            ),
            &["version", "git_commit", "build_time"],
        )?;
        let scrape_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "slurm_exporter_scrape_duration_seconds",
                "Duration of upstream endpoint scrapes",
            ),
            &["endpoint"],
        )?;
        let scrape_success = GaugeVec::new(
            Opts::new(
                "slurm_exporter_scrape_success",
                "Whether the last scrape of the endpoint succeeded (1) or failed (0)",
            ),
            &["endpoint"],
        )?;
        let scrape_errors_total = CounterVec::new(
            Opts::new(
                "slurm_exporter_scrape_errors_total",
                "Total number of failed scrapes by endpoint",
            ),
            &["endpoint"],
        )?;
        let scrape_skipped_lines_total = CounterVec::new(
            Opts::new(
                "slurm_exporter_scrape_skipped_lines_total",
                "Total number of unparseable exposition lines dropped by endpoint",
            ),
            &["endpoint"],
        )?;
        let http_requests_total = CounterVec::new(
            Opts::new(
                "slurm_exporter_http_requests_total",
                "Total number of HTTP requests received by the exporter",
            ),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "slurm_exporter_http_request_duration_seconds",
                "Duration of HTTP requests served by the exporter",
            ),
            &["method", "path"],
        )?;

        registry.register(Box::new(build_info.clone()))?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(scrape_success.clone()))?;
        registry.register(Box::new(scrape_errors_total.clone()))?;
        registry.register(Box::new(scrape_skipped_lines_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        build_info
            .with_label_values(&[
                build.version.as_str(),
                build.git_commit.as_str(),
                build.build_time.as_str(),
            ])
            .set(1.0);

        Ok(Self {
            registry,
            build_info,
            scrape_duration_seconds,
            scrape_success,
            scrape_errors_total,
            scrape_skipped_lines_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    pub fn observe_duration(&self, endpoint: &str, seconds: f64) {
        self.scrape_duration_seconds
            .with_label_values(&[endpoint])
            .observe(seconds);
    }

    pub fn set_success(&self, endpoint: &str, success: bool) {
        self.scrape_success
            .with_label_values(&[endpoint])
            .set(if success { 1.0 } else { 0.0 });
    }

    pub fn increment_errors(&self, endpoint: &str) {
        self.scrape_errors_total.with_label_values(&[endpoint]).inc();
    }

    pub fn record_skipped_lines(&self, endpoint: &str, count: usize) {
        self.scrape_skipped_lines_total
            .with_label_values(&[endpoint])
            .inc_by(count as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, seconds: f64) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(seconds);
    }

    /// Appends all self-metrics in text format.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), prometheus::Error> {
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), out)
    }

    /// Content type of the text exposition format.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_build() -> BuildInfo {
        BuildInfo {
            version: "0.1.0".into(),
            git_commit: "abc123".into(),
            build_time: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_instances_do_not_collide() {
        let first = ExporterMetrics::new(&test_build()).unwrap();
        let second = ExporterMetrics::new(&test_build()).unwrap();
        first.increment_errors("jobs");
        assert_eq!(
            first.scrape_errors_total.with_label_values(&["jobs"]).get(),
            1.0
        );
        assert_eq!(
            second.scrape_errors_total.with_label_values(&["jobs"]).get(),
            0.0
        );
    }

    #[test]
    fn test_success_gauge_is_overwritten() {
        let metrics = ExporterMetrics::new(&test_build()).unwrap();
        metrics.set_success("nodes", true);
        metrics.set_success("nodes", false);
        assert_eq!(
            metrics.scrape_success.with_label_values(&["nodes"]).get(),
            0.0
        );
    }

    #[test]
    fn test_encode_contains_build_info_and_scrape_metrics() {
        let metrics = ExporterMetrics::new(&test_build()).unwrap();
        metrics.observe_duration("scheduler", 0.2);
        metrics.set_success("scheduler", true);
        metrics.record_http_request("GET", "/metrics", 200, 0.3);

        let mut out = Vec::new();
        metrics.encode(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains(
            "slurm_exporter_build_info{build_time=\"2024-01-01T00:00:00Z\",git_commit=\"abc123\",version=\"0.1.0\"} 1"
        ));
        assert!(text.contains("slurm_exporter_scrape_success{endpoint=\"scheduler\"} 1"));
        assert!(text.contains("slurm_exporter_scrape_duration_seconds_count{endpoint=\"scheduler\"} 1"));
        assert!(text.contains(
            "slurm_exporter_http_requests_total{method=\"GET\",path=\"/metrics\",status=\"200\"} 1"
        ));
        assert!(metrics.content_type().starts_with("text/plain"));
    }
}
