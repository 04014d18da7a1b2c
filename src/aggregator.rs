//! Aggregation orchestrator.
//!
//! One scrape fans out to every enabled endpoint concurrently under a shared
//! deadline and concatenates the successful results in declaration order.
//! A failing endpoint only removes its own families from the output.

use ahash::AHashMap;
use futures::{stream::FuturesUnordered, StreamExt};
use std::io::{self, Write};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::exposition::{write_families, MetricFamily};
use crate::fetcher::{EndpointFetcher, EndpointResult, EndpointSpec};

/// Per-endpoint result summary kept in a `ScrapeReport`.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointOutcome {
    pub endpoint: String,
    pub status: OutcomeStatus,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Success { families: usize },
    Failure { kind: &'static str, message: String },
}

impl EndpointOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }
}

/// Result of one scrape: the merged output plus what happened per endpoint.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub families: Vec<MetricFamily>,
    pub outcomes: Vec<EndpointOutcome>,
    /// Family names exposed by more than one endpoint. Each such family is
    /// written once per endpoint, so output containing one does not parse
    /// back: the second `# TYPE` line is a structural error.
    pub duplicate_families: Vec<String>,
}

impl ScrapeReport {
    /// Builds a report from results given in endpoint declaration order.
    pub fn assemble(results: Vec<EndpointResult>) -> Self {
        let mut report = ScrapeReport::default();
        let mut owners: AHashMap<String, String> = AHashMap::new();

        for result in results {
            let EndpointResult {
                endpoint,
                outcome,
                elapsed,
            } = result;

            let status = match outcome {
                Ok(families) => {
                    let count = families.len();
                    for family in families {
                        match owners.get(&family.name) {
                            Some(owner) if owner != &endpoint => {
                                if !report.duplicate_families.contains(&family.name) {
                                    warn!(
                                        family = %family.name,
                                        first = %owner,
                                        second = %endpoint,
                                        "Metric family exposed by more than one endpoint"
                                    );
                                    report.duplicate_families.push(family.name.clone());
                                }
                            }
                            Some(_) => {}
                            None => {
                                owners.insert(family.name.clone(), endpoint.clone());
                            }
                        }
                        report.families.push(family);
                    }
                    OutcomeStatus::Success { families: count }
                }
                Err(e) => OutcomeStatus::Failure {
                    kind: e.kind(),
                    message: e.to_string(),
                },
            };

            report.outcomes.push(EndpointOutcome {
                endpoint,
                status,
                elapsed,
            });
        }

        report
    }

    pub fn outcome(&self, endpoint: &str) -> Option<&EndpointOutcome> {
        self.outcomes.iter().find(|o| o.endpoint == endpoint)
    }

    pub fn failed_endpoints(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    /// True when at least one endpoint was scraped and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.failed_endpoints() == self.outcomes.len()
    }

    /// Serializes the merged families in text exposition format.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_families(out, &self.families)
    }
}

/// Scrapes all enabled endpoints and merges their output.
#[derive(Clone)]
pub struct Aggregator {
    fetcher: EndpointFetcher,
    endpoints: Vec<EndpointSpec>,
    scrape_timeout: Duration,
}

impl Aggregator {
    /// Keeps only enabled endpoints, in declaration order.
    pub fn new(fetcher: EndpointFetcher, endpoints: &[EndpointSpec], scrape_timeout: Duration) -> Self {
        Self {
            fetcher,
            endpoints: endpoints.iter().filter(|e| e.enabled).cloned().collect(),
            scrape_timeout,
        }
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    pub fn fetcher(&self) -> &EndpointFetcher {
        &self.fetcher
    }

    pub fn scrape_timeout(&self) -> Duration {
        self.scrape_timeout
    }

    /// Runs one scrape. Dropping the returned future cancels every in-flight
    /// endpoint request.
    pub async fn scrape(&self) -> ScrapeReport {
        let deadline = Instant::now() + self.scrape_timeout;
        let start = Instant::now();

        let mut pending = FuturesUnordered::new();
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let fetcher = &self.fetcher;
            pending.push(async move { (index, fetcher.fetch(endpoint, deadline).await) });
        }

        // Completion order varies; slots keep declaration order
        let mut slots: Vec<Option<EndpointResult>> = Vec::with_capacity(self.endpoints.len());
        slots.resize_with(self.endpoints.len(), || None);
        while let Some((index, result)) = pending.next().await {
            slots[index] = Some(result);
        }
        let results: Vec<EndpointResult> = slots.into_iter().flatten().collect();

        let report = ScrapeReport::assemble(results);
        debug!(
            endpoints = report.outcomes.len(),
            failed = report.failed_endpoints(),
            families = report.families.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scrape finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposition::{ExpositionError, MetricKind, Sample};
    use crate::fetcher::FetchError;

    fn family(name: &str, value: f64) -> MetricFamily {
        MetricFamily::new(name, MetricKind::Gauge).with_sample(Sample::new(name, value))
    }

    fn ok(endpoint: &str, families: Vec<MetricFamily>) -> EndpointResult {
        EndpointResult {
            endpoint: endpoint.to_string(),
            outcome: Ok(families),
            elapsed: Duration::from_millis(5),
        }
    }

    fn failed(endpoint: &str, error: FetchError) -> EndpointResult {
        EndpointResult {
            endpoint: endpoint.to_string(),
            outcome: Err(error),
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_assembly_follows_declaration_order() {
        let report = ScrapeReport::assemble(vec![
            ok("jobs", vec![family("slurm_jobs", 1.0)]),
            ok("nodes", vec![family("slurm_nodes", 2.0), family("slurm_cpus", 3.0)]),
        ]);
        let names: Vec<&str> = report.families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["slurm_jobs", "slurm_nodes", "slurm_cpus"]);
        assert_eq!(
            report.outcome("nodes").unwrap().status,
            OutcomeStatus::Success { families: 2 }
        );
    }

    #[test]
    fn test_failure_is_isolated() {
        let report = ScrapeReport::assemble(vec![
            ok("jobs", vec![family("slurm_jobs", 1.0)]),
            failed(
                "nodes",
                FetchError::UnexpectedStatus {
                    url: "http://x/metrics/nodes".into(),
                    status: 500,
                },
            ),
            ok("partitions", vec![family("slurm_partitions", 4.0)]),
        ]);
        assert_eq!(report.families.len(), 2);
        assert_eq!(report.failed_endpoints(), 1);
        assert!(!report.all_failed());
        match &report.outcome("nodes").unwrap().status {
            OutcomeStatus::Failure { kind, message } => {
                assert_eq!(*kind, "status");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_all_failed() {
        let report = ScrapeReport::assemble(vec![failed(
            "jobs",
            FetchError::MalformedExposition {
                url: "http://x/metrics/jobs".into(),
                source: ExpositionError {
                    line: 1,
                    reason: "duplicate TYPE".into(),
                },
            },
        )]);
        assert!(report.all_failed());
        assert!(report.families.is_empty());
        assert!(!ScrapeReport::default().all_failed());
    }

    #[test]
    fn test_duplicate_families_kept_as_separate_blocks() {
        let report = ScrapeReport::assemble(vec![
            ok("jobs", vec![family("slurm_up", 1.0)]),
            ok("nodes", vec![family("slurm_up", 1.0)]),
        ]);
        assert_eq!(report.families.len(), 2);
        assert_eq!(report.duplicate_families, vec!["slurm_up".to_string()]);

        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("# TYPE slurm_up gauge").count(), 2);

        let err = crate::exposition::parse(&text).unwrap_err();
        assert!(err.reason.contains("second TYPE"));
    }

    #[test]
    fn test_output_without_duplicates_parses_back() {
        let report = ScrapeReport::assemble(vec![
            ok("jobs", vec![family("slurm_jobs", 1.0)]),
            ok("nodes", vec![family("slurm_nodes", 2.0)]),
        ]);
        assert!(report.duplicate_families.is_empty());

        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        let parsed = crate::exposition::parse(&String::from_utf8(out).unwrap()).unwrap();
        assert_eq!(parsed.families, report.families);
    }
}
