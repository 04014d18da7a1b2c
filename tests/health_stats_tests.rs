//! Integration tests for health stats module.
//!
//! These tests verify that HealthStats classifies scrapes, keeps per-endpoint
//! tallies and renders them in the /health table.

use slurm_metrics_exporter::health_stats::HealthStats;
use slurm_metrics_exporter::{
    EndpointResult, FetchError, MetricFamily, MetricKind, Sample, ScrapeReport,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn ok(endpoint: &str, family: &str) -> EndpointResult {
    EndpointResult {
        endpoint: endpoint.to_string(),
        outcome: Ok(vec![MetricFamily::new(family, MetricKind::Gauge)
            .with_sample(Sample::new(family, 1.0))]),
        elapsed: Duration::from_millis(5),
    }
}

fn failed(endpoint: &str, status: u16) -> EndpointResult {
    EndpointResult {
        endpoint: endpoint.to_string(),
        outcome: Err(FetchError::UnexpectedStatus {
            url: format!("http://slurm:6817/metrics/{}", endpoint),
            status,
        }),
        elapsed: Duration::from_millis(5),
    }
}

#[test]
fn test_health_stats_initial_state() {
    let stats = HealthStats::new();

    assert_eq!(stats.total_scrapes.load(Ordering::Relaxed), 0);
    assert!(!stats.last_scrape_all_failed());
    assert_eq!(stats.get_scrape_success_rate(), 100.0);
    assert_eq!(stats.get_last_scrape_time_str(), "N/A");
    assert!(stats.endpoint_tally("jobs").is_none());

    let (cur, avg, _, _, count) = stats.scrape_duration_seconds.snapshot();
    assert_eq!(count, 0);
    assert_eq!(cur, 0.0);
    assert_eq!(avg, 0.0);
}

#[test]
fn test_scrapes_are_classified() {
    let stats = HealthStats::new();

    let complete = ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs"), ok("nodes", "slurm_nodes")]);
    stats.record_scrape(&complete, 0.2);

    let partial = ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs"), failed("nodes", 500)]);
    stats.record_scrape(&partial, 0.4);
    assert!(!stats.last_scrape_all_failed());

    let dead = ScrapeReport::assemble(vec![failed("jobs", 502), failed("nodes", 502)]);
    stats.record_scrape(&dead, 0.1);
    assert!(stats.last_scrape_all_failed());

    assert_eq!(stats.total_scrapes.load(Ordering::Relaxed), 3);
    assert_eq!(stats.complete_scrapes.load(Ordering::Relaxed), 1);
    assert_eq!(stats.partial_scrapes.load(Ordering::Relaxed), 1);
    assert_eq!(stats.failed_scrapes.load(Ordering::Relaxed), 1);

    let (cur, _, max, min, count) = stats.scrape_duration_seconds.snapshot();
    assert_eq!(count, 3);
    assert_eq!(cur, 0.1);
    assert_eq!(max, 0.4);
    assert_eq!(min, 0.1);

    let (failed_cur, _, failed_max, _, _) = stats.failed_endpoints.snapshot();
    assert_eq!(failed_cur, 2.0);
    assert_eq!(failed_max, 2.0);

    assert_ne!(stats.get_last_scrape_time_str(), "N/A");
}

#[test]
fn test_recovery_clears_all_failed_flag() {
    let stats = HealthStats::new();

    stats.record_scrape(&ScrapeReport::assemble(vec![failed("jobs", 503)]), 0.1);
    assert!(stats.last_scrape_all_failed());

    stats.record_scrape(&ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs")]), 0.1);
    assert!(!stats.last_scrape_all_failed());
}

#[test]
fn test_empty_report_is_not_a_failed_scrape() {
    let stats = HealthStats::new();
    stats.record_scrape(&ScrapeReport::default(), 0.0);

    assert!(!stats.last_scrape_all_failed());
    assert_eq!(stats.failed_scrapes.load(Ordering::Relaxed), 0);
    assert_eq!(stats.complete_scrapes.load(Ordering::Relaxed), 1);
}

#[test]
fn test_endpoint_tally_keeps_last_error() {
    let stats = HealthStats::new();

    stats.record_scrape(
        &ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs"), failed("nodes", 500)]),
        0.1,
    );
    stats.record_scrape(
        &ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs"), failed("nodes", 404)]),
        0.1,
    );

    let jobs = stats.endpoint_tally("jobs").unwrap();
    assert_eq!(jobs.successes, 2);
    assert_eq!(jobs.failures, 0);
    assert!(jobs.last_error.is_none());

    let nodes = stats.endpoint_tally("nodes").unwrap();
    assert_eq!(nodes.successes, 0);
    assert_eq!(nodes.failures, 2);
    assert!(nodes.last_error.unwrap().contains("404"));
}

#[test]
fn test_success_rate_counts_only_complete_scrapes() {
    let stats = HealthStats::new();
    stats.record_scrape(&ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs")]), 0.1);
    stats.record_scrape(
        &ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs"), failed("nodes", 500)]),
        0.1,
    );

    assert!((stats.get_scrape_success_rate() - 50.0).abs() < 0.01);
}

#[test]
fn test_render_table_sections() {
    let stats = HealthStats::new();
    stats.record_scrape(
        &ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs"), failed("nodes", 500)]),
        0.25,
    );
    stats.record_http_request();
    stats.record_request_duration(12.5);
    stats.record_metrics_endpoint_call();
    stats.record_metrics_response_size_kb(3.2);

    let table = stats.render_table();

    assert!(table.contains("HEALTH ENDPOINT - EXPORTER INTERNAL STATS"));
    assert!(table.contains("SCRAPE PERFORMANCE"));
    assert!(table.contains("ENDPOINTS"));
    assert!(table.contains("HTTP SERVER"));
    assert!(table.contains("scrape_duration (s)"));
    assert!(table.contains("partial_scrapes"));
    assert!(table.contains("unexpected status code 500"));
    assert!(table.contains("number of done scrapes: 1"));

    let jobs_pos = table.find("jobs ").unwrap();
    let nodes_pos = table.find("nodes ").unwrap();
    assert!(jobs_pos < nodes_pos);
}

#[test]
fn test_http_counters() {
    let stats = HealthStats::new();

    for _ in 0..3 {
        stats.record_http_request();
    }
    stats.record_encoding_error();

    assert_eq!(stats.http_request_timestamps.count_last_minute(), 3);
    assert_eq!(stats.encoding_errors.load(Ordering::Relaxed), 1);
}

#[test]
fn test_health_stats_thread_safety() {
    use std::thread;

    let stats = Arc::new(HealthStats::new());
    let mut handles = vec![];

    for i in 0..10 {
        let stats = Arc::clone(&stats);
        handles.push(thread::spawn(move || {
            let report = if i % 2 == 0 {
                ScrapeReport::assemble(vec![ok("jobs", "slurm_jobs")])
            } else {
                ScrapeReport::assemble(vec![failed("jobs", 500)])
            };
            stats.record_scrape(&report, i as f64 * 0.1);
            stats.record_http_request();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(stats.total_scrapes.load(Ordering::Relaxed), 10);
    let jobs = stats.endpoint_tally("jobs").unwrap();
    assert_eq!(jobs.successes + jobs.failures, 10);
    assert_eq!(stats.http_request_timestamps.count_last_minute(), 10);
}
