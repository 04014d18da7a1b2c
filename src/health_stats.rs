//! Health statistics for the exporter.
//!
//! Tracks scrape performance, per-endpoint outcomes and HTTP request
//! activity, and renders them as the plain-text table served on `/health`.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant, SystemTime};

use crate::aggregator::{OutcomeStatus, ScrapeReport};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns (last, avg, max, min, count).
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Thread-safe circular buffer for tracking HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            // Keep ten minutes of history at most
            let cutoff = now.checked_sub(Duration::from_secs(600));
            while let (Some(&front), Some(cutoff)) = (guard.front(), cutoff) {
                if front >= cutoff {
                    break;
                }
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            match Instant::now().checked_sub(Duration::from_secs(60)) {
                Some(cutoff) => guard.iter().filter(|&&t| t >= cutoff).count() as u64,
                None => guard.len() as u64,
            }
        } else {
            0
        }
    }
}

/// Success and failure tally of one endpoint across scrapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointTally {
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Exporter-wide health statistics.
pub struct HealthStats {
    // Scrape performance
    pub scrape_duration_seconds: Stat,
    pub failed_endpoints: Stat,
    pub merged_families: Stat,
    pub total_scrapes: AtomicU64,
    pub complete_scrapes: AtomicU64,
    pub partial_scrapes: AtomicU64,
    pub failed_scrapes: AtomicU64,
    last_scrape_all_failed: AtomicBool,
    endpoints: Mutex<BTreeMap<String, EndpointTally>>,

    // HTTP server stats
    pub http_request_timestamps: RequestTimestamps,
    pub request_duration_ms: Stat,
    pub metrics_endpoint_calls: AtomicU64,
    pub metrics_response_size_kb: Stat,
    pub encoding_errors: AtomicU64,

    // Timing
    pub start_time: Instant,
    pub last_scrape_time: StdRwLock<Option<SystemTime>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            scrape_duration_seconds: Stat::default(),
            failed_endpoints: Stat::default(),
            merged_families: Stat::default(),
            total_scrapes: AtomicU64::new(0),
            complete_scrapes: AtomicU64::new(0),
            partial_scrapes: AtomicU64::new(0),
            failed_scrapes: AtomicU64::new(0),
            last_scrape_all_failed: AtomicBool::new(false),
            endpoints: Mutex::new(BTreeMap::new()),
            http_request_timestamps: RequestTimestamps::default(),
            request_duration_ms: Stat::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            metrics_response_size_kb: Stat::default(),
            encoding_errors: AtomicU64::new(0),
            start_time: Instant::now(),
            last_scrape_time: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records the outcome of one finished scrape.
    pub fn record_scrape(&self, report: &ScrapeReport, duration_seconds: f64) {
        let failed = report.failed_endpoints();

        self.scrape_duration_seconds.add_sample(duration_seconds);
        self.failed_endpoints.add_sample(failed as f64);
        self.merged_families.add_sample(report.families.len() as f64);
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);

        if report.all_failed() {
            self.failed_scrapes.fetch_add(1, Ordering::Relaxed);
        } else if failed > 0 {
            self.partial_scrapes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.complete_scrapes.fetch_add(1, Ordering::Relaxed);
        }
        self.last_scrape_all_failed
            .store(report.all_failed(), Ordering::Relaxed);

        if let Ok(mut endpoints) = self.endpoints.lock() {
            for outcome in &report.outcomes {
                let tally = endpoints.entry(outcome.endpoint.clone()).or_default();
                match &outcome.status {
                    OutcomeStatus::Success { .. } => tally.successes += 1,
                    OutcomeStatus::Failure { message, .. } => {
                        tally.failures += 1;
                        tally.last_error = Some(message.clone());
                    }
                }
            }
        }

        if let Ok(mut guard) = self.last_scrape_time.write() {
            *guard = Some(SystemTime::now());
        }
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_request_duration(&self, duration_ms: f64) {
        self.request_duration_ms.add_sample(duration_ms);
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metrics_response_size_kb(&self, size_kb: f64) {
        self.metrics_response_size_kb.add_sample(size_kb);
    }

    pub fn record_encoding_error(&self) {
        self.encoding_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// True when the most recent scrape had every endpoint fail.
    pub fn last_scrape_all_failed(&self) -> bool {
        self.last_scrape_all_failed.load(Ordering::Relaxed)
    }

    pub fn endpoint_tally(&self, endpoint: &str) -> Option<EndpointTally> {
        self.endpoints
            .lock()
            .ok()
            .and_then(|endpoints| endpoints.get(endpoint).cloned())
    }

    pub fn get_scrape_success_rate(&self) -> f64 {
        let complete = self.complete_scrapes.load(Ordering::Relaxed);
        let total = self.total_scrapes.load(Ordering::Relaxed);
        if total == 0 {
            100.0
        } else {
            (complete as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_hours(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() / 3600.0
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Wall-clock time of the last scrape as `HH:MM:SS` UTC.
    pub fn get_last_scrape_time_str(&self) -> String {
        const SECS_PER_DAY: u64 = 86400;
        const SECS_PER_HOUR: u64 = 3600;
        const SECS_PER_MINUTE: u64 = 60;

        let last = self.last_scrape_time.read().ok().and_then(|guard| *guard);
        match last.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok()) {
            Some(since_epoch) => {
                let secs = since_epoch.as_secs();
                format!(
                    "{:02}:{:02}:{:02}",
                    (secs % SECS_PER_DAY) / SECS_PER_HOUR,
                    (secs % SECS_PER_HOUR) / SECS_PER_MINUTE,
                    secs % SECS_PER_MINUTE
                )
            }
            None => "N/A".to_string(),
        }
    }

    pub fn render_table(&self) -> String {
        let mut table = Table::default();

        table.title("HEALTH ENDPOINT - EXPORTER INTERNAL STATS");
        table.header();

        table.section("SCRAPE PERFORMANCE");
        table.stat_row("scrape_duration (s)", &self.scrape_duration_seconds, 3, 3);
        table.stat_row("failed_endpoints", &self.failed_endpoints, 0, 1);
        table.stat_row("merged_families", &self.merged_families, 0, 1);
        table.value_row(
            "scrape_success_rate (%)",
            format!("{:.1}", self.get_scrape_success_rate()),
        );
        table.value_row(
            "partial_scrapes",
            self.partial_scrapes.load(Ordering::Relaxed).to_string(),
        );
        table.value_row(
            "failed_scrapes",
            self.failed_scrapes.load(Ordering::Relaxed).to_string(),
        );

        table.section("ENDPOINTS");
        if let Ok(endpoints) = self.endpoints.lock() {
            for (name, tally) in endpoints.iter() {
                table.line(format!(
                    "{:left$} | ok: {} | failed: {} | last error: {}",
                    name,
                    tally.successes,
                    tally.failures,
                    tally.last_error.as_deref().unwrap_or("-"),
                    left = LEFT_COL
                ));
            }
        }

        table.section("HTTP SERVER");
        table.value_row(
            "http_requests_last_minute",
            self.http_request_timestamps.count_last_minute().to_string(),
        );
        table.stat_row("request_duration (ms)", &self.request_duration_ms, 1, 1);
        table.value_row(
            "metrics_endpoint_calls",
            self.metrics_endpoint_calls.load(Ordering::Relaxed).to_string(),
        );
        table.stat_row(
            "metrics_response_size (KB)",
            &self.metrics_response_size_kb,
            1,
            1,
        );
        table.value_row(
            "encoding_errors",
            self.encoding_errors.load(Ordering::Relaxed).to_string(),
        );

        table.blank();
        table.line(format!(
            "number of done scrapes: {} | last scrape: {} | uptime: {:.1}h",
            self.total_scrapes.load(Ordering::Relaxed),
            self.get_last_scrape_time_str(),
            self.get_uptime_hours()
        ));

        table.out
    }
}

const LEFT_COL: usize = 26;
const COL_W: usize = 12;

#[derive(Default)]
struct Table {
    out: String,
}

impl Table {
    fn title(&mut self, title: &str) {
        writeln!(self.out, "{}", title).ok();
        writeln!(self.out, "{}", "=".repeat(title.len())).ok();
        writeln!(self.out).ok();
    }

    fn header(&mut self) {
        self.row("", "current", "average", "max", "min");
    }

    fn section(&mut self, name: &str) {
        writeln!(self.out).ok();
        writeln!(self.out, "{}", name).ok();
        writeln!(self.out, "{}", "-".repeat(name.len())).ok();
    }

    fn blank(&mut self) {
        writeln!(self.out).ok();
    }

    fn line(&mut self, line: String) {
        writeln!(self.out, "{}", line).ok();
    }

    fn row(&mut self, label: &str, cur: &str, avg: &str, max: &str, min: &str) {
        writeln!(
            self.out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            label,
            cur,
            avg,
            max,
            min,
            left = LEFT_COL,
            col = COL_W
        )
        .ok();
    }

    fn stat_row(&mut self, label: &str, stat: &Stat, precision: usize, avg_precision: usize) {
        let (cur, avg, max, min, _) = stat.snapshot();
        self.row(
            label,
            &format!("{:.p$}", cur, p = precision),
            &format!("{:.p$}", avg, p = avg_precision),
            &format!("{:.p$}", max, p = precision),
            &format!("{:.p$}", min, p = precision),
        );
    }

    fn value_row(&mut self, label: &str, value: String) {
        self.row(label, &value, "N/A", "N/A", "N/A");
    }
}
