//! Text exposition format parser.
//!
//! Decodes one endpoint's response body into an ordered list of metric
//! families. A single malformed data line is skipped with a warning and
//! counted; only structural anomalies (conflicting `HELP`/`TYPE` metadata,
//! unknown types, invalid UTF-8) reject the whole body.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::model::{MetricFamily, MetricKind, Sample};

static METRIC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid metric name regex"));
static LABEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label name regex"));

/// Returns true if `name` is a syntactically valid metric name.
pub fn is_valid_metric_name(name: &str) -> bool {
    METRIC_NAME_RE.is_match(name)
}

/// Returns true if `name` is a syntactically valid label name.
pub fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME_RE.is_match(name)
}

/// Structural parse failure that invalidates the whole body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed exposition at line {line}: {reason}")]
pub struct ExpositionError {
    pub line: usize,
    pub reason: String,
}

/// Result of parsing one body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExposition {
    pub families: Vec<MetricFamily>,
    /// Data lines dropped by skip-and-continue.
    pub skipped_lines: usize,
}

/// Parses a raw response body.
pub fn parse_bytes(body: &[u8]) -> Result<ParsedExposition, ExpositionError> {
    let text = std::str::from_utf8(body).map_err(|e| {
        let line = body[..e.valid_up_to()]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1;
        ExpositionError {
            line,
            reason: "invalid UTF-8".to_string(),
        }
    })?;
    parse(text)
}

/// Parses exposition text.
pub fn parse(text: &str) -> Result<ParsedExposition, ExpositionError> {
    let mut parser = Parser::default();
    for (idx, line) in text.lines().enumerate() {
        parser.parse_line(idx + 1, line)?;
    }
    Ok(parser.finish())
}

/// Tracks which metadata lines a family has already received.
#[derive(Debug, Default, Clone, Copy)]
struct Declared {
    help: bool,
    kind: bool,
}

#[derive(Default)]
struct Parser {
    families: Vec<MetricFamily>,
    declared: Vec<Declared>,
    index: HashMap<String, usize>,
    skipped_lines: usize,
}

impl Parser {
    fn parse_line(&mut self, line_no: usize, line: &str) -> Result<(), ExpositionError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if let Some(comment) = line.strip_prefix('#') {
            return self.parse_comment(line_no, comment);
        }

        match parse_sample(line) {
            Ok(sample) => {
                let idx = self.family_for_sample(&sample.name);
                self.families[idx].samples.push(sample);
            }
            Err(reason) => {
                warn!(line = line_no, "Skipping unparseable exposition line: {}", reason);
                self.skipped_lines += 1;
            }
        }
        Ok(())
    }

    fn parse_comment(&mut self, line_no: usize, comment: &str) -> Result<(), ExpositionError> {
        let (keyword, rest) = split_token(comment.trim_start());
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(());
        }

        let (name, rest) = split_token(rest.trim_start());
        if name.is_empty() {
            return Err(malformed(line_no, format!("{keyword} line without metric name")));
        }
        if !is_valid_metric_name(name) {
            return Err(malformed(line_no, format!("invalid metric name '{name}'")));
        }

        if keyword == "HELP" {
            let idx = self.family_index(name);
            if self.declared[idx].help {
                return Err(malformed(line_no, format!("second HELP line for {name}")));
            }
            self.declared[idx].help = true;
            self.families[idx].help = unescape_help(rest);
        } else {
            let token = rest.trim();
            let kind = MetricKind::from_token(token).ok_or_else(|| {
                malformed(line_no, format!("unknown metric type '{token}' for {name}"))
            })?;
            let idx = self.family_index(name);
            if self.declared[idx].kind {
                return Err(malformed(line_no, format!("second TYPE line for {name}")));
            }
            self.declared[idx].kind = true;
            self.families[idx].kind = kind;
        }
        Ok(())
    }

    /// Index of the family named exactly `name`, created untyped if unseen.
    fn family_index(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.families.len();
        self.families.push(MetricFamily::new(name, MetricKind::Untyped));
        self.declared.push(Declared::default());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Resolves the family a series belongs to, honoring histogram and
    /// summary child suffixes.
    fn family_for_sample(&mut self, series: &str) -> usize {
        if let Some(&idx) = self.index.get(series) {
            return idx;
        }
        for suffix in ["_bucket", "_sum", "_count"] {
            let Some(base) = series.strip_suffix(suffix) else {
                continue;
            };
            if let Some(&idx) = self.index.get(base) {
                if self.families[idx].kind.child_suffixes().contains(&suffix) {
                    return idx;
                }
            }
        }
        self.family_index(series)
    }

    fn finish(self) -> ParsedExposition {
        ParsedExposition {
            families: self.families,
            skipped_lines: self.skipped_lines,
        }
    }
}

fn malformed(line: usize, reason: String) -> ExpositionError {
    ExpositionError { line, reason }
}

/// Splits off the first whitespace-delimited token. The remainder has the
/// single separating whitespace character removed.
fn split_token(input: &str) -> (&str, &str) {
    match input.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((idx, c)) => (&input[..idx], &input[idx + c.len_utf8()..]),
        None => (input, ""),
    }
}

/// Parses `name[{labels}] value [timestamp]`.
fn parse_sample(line: &str) -> Result<Sample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_valid_metric_name(name) {
        return Err(format!("invalid metric name '{name}'"));
    }

    let mut rest = line[name_end..].trim_start();
    let mut labels = Vec::new();
    if let Some(body) = rest.strip_prefix('{') {
        let (parsed, after) = parse_labels(body)?;
        labels = parsed;
        rest = after;
    }

    let mut tokens = rest.split_whitespace();
    let value_token = tokens
        .next()
        .ok_or_else(|| format!("missing value for '{name}'"))?;
    let value =
        parse_value(value_token).ok_or_else(|| format!("invalid value '{value_token}'"))?;
    let timestamp_ms = match tokens.next() {
        Some(token) => Some(
            token
                .parse::<i64>()
                .map_err(|_| format!("invalid timestamp '{token}'"))?,
        ),
        None => None,
    };
    if let Some(extra) = tokens.next() {
        return Err(format!("unexpected trailing token '{extra}'"));
    }

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
        timestamp_ms,
    })
}

/// Parses the inside of a `{...}` label list. Returns the labels and the
/// text following the closing brace.
fn parse_labels(input: &str) -> Result<(Vec<(String, String)>, &str), String> {
    let mut labels: Vec<(String, String)> = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Err("unterminated label set".to_string());
        }
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let key_end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        if !is_valid_label_name(key) {
            return Err(format!("invalid label name '{key}'"));
        }
        if key.starts_with("__") {
            return Err(format!("reserved label name '{key}'"));
        }
        if labels.iter().any(|(k, _)| k == key) {
            return Err(format!("duplicate label '{key}'"));
        }

        rest = rest[key_end..]
            .trim_start()
            .strip_prefix('=')
            .ok_or_else(|| format!("expected '=' after label '{key}'"))?
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| format!("expected quoted value for label '{key}'"))?;

        let (value, after) =
            read_quoted(rest).ok_or_else(|| format!("unterminated value for label '{key}'"))?;
        labels.push((key.to_string(), value));

        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if !rest.starts_with('}') {
            return Err(format!("expected ',' or '}}' after label '{key}'"));
        }
    }
}

/// Reads an escaped label value up to its closing quote.
fn read_quoted(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Some((value, &input[idx + 1..])),
            '\\' => match chars.next()? {
                (_, 'n') => value.push('\n'),
                (_, '\\') => value.push('\\'),
                (_, '"') => value.push('"'),
                (_, other) => {
                    value.push('\\');
                    value.push(other);
                }
            },
            other => value.push(other),
        }
    }
    None
}

fn unescape_help(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_value(token: &str) -> Option<f64> {
    match token {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => token.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = r#"# HELP slurm_nodes_idle Number of idle nodes
# TYPE slurm_nodes_idle gauge
slurm_nodes_idle 5
# HELP slurm_node_cpus Allocated CPUs per node
# TYPE slurm_node_cpus gauge
slurm_node_cpus{node="c001",state="alloc"} 64
slurm_node_cpus{node="c002",state="idle"} 0 1700000000000
"#;

    #[test]
    fn test_parse_families_in_order() {
        let parsed = parse(NODES).unwrap();
        assert_eq!(parsed.skipped_lines, 0);
        assert_eq!(parsed.families.len(), 2);

        let idle = &parsed.families[0];
        assert_eq!(idle.name, "slurm_nodes_idle");
        assert_eq!(idle.help, "Number of idle nodes");
        assert_eq!(idle.kind, MetricKind::Gauge);
        assert_eq!(idle.samples, vec![Sample::new("slurm_nodes_idle", 5.0)]);

        let cpus = &parsed.families[1];
        assert_eq!(cpus.samples.len(), 2);
        assert_eq!(cpus.samples[0].label("node"), Some("c001"));
        assert_eq!(cpus.samples[0].label("state"), Some("alloc"));
        assert_eq!(cpus.samples[1].timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_sample_without_metadata_creates_untyped_family() {
        let parsed = parse("slurm_jobs_pending 12\n").unwrap();
        let family = &parsed.families[0];
        assert_eq!(family.kind, MetricKind::Untyped);
        assert!(family.help.is_empty());
        assert_eq!(family.samples[0].value, 12.0);
    }

    #[test]
    fn test_escaped_label_values_are_unescaped() {
        let parsed = parse(r#"m{path="C:\\tmp",msg="say \"hi\"\nbye"} 1"#).unwrap();
        let sample = &parsed.families[0].samples[0];
        assert_eq!(sample.label("path"), Some(r"C:\tmp"));
        assert_eq!(sample.label("msg"), Some("say \"hi\"\nbye"));
    }

    #[test]
    fn test_label_list_whitespace_and_trailing_comma() {
        let parsed = parse("m{ a = \"1\" , b=\"2\", } 3\n").unwrap();
        let sample = &parsed.families[0].samples[0];
        assert_eq!(
            sample.labels,
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
        assert_eq!(sample.value, 3.0);
    }

    #[test]
    fn test_histogram_children_attach_to_family() {
        let text = "# TYPE slurm_job_wait_seconds histogram\n\
                    slurm_job_wait_seconds_bucket{le=\"1\"} 2\n\
                    slurm_job_wait_seconds_bucket{le=\"+Inf\"} 5\n\
                    slurm_job_wait_seconds_sum 7.5\n\
                    slurm_job_wait_seconds_count 5\n";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.families.len(), 1);
        let family = &parsed.families[0];
        assert_eq!(family.kind, MetricKind::Histogram);
        assert_eq!(family.samples.len(), 4);
        assert_eq!(family.samples[2].name, "slurm_job_wait_seconds_sum");
    }

    #[test]
    fn test_summary_does_not_claim_bucket_series() {
        let text = "# TYPE rpc summary\nrpc_bucket 1\nrpc_count 2\n";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.families.len(), 2);
        assert_eq!(parsed.families[0].samples.len(), 1);
        assert_eq!(parsed.families[1].name, "rpc_bucket");
    }

    #[test]
    fn test_special_values() {
        let parsed = parse("a +Inf\nb -Inf\nc NaN\nd 1.5e3\n").unwrap();
        let values: Vec<f64> = parsed
            .families
            .iter()
            .map(|f| f.samples[0].value)
            .collect();
        assert_eq!(values[0], f64::INFINITY);
        assert_eq!(values[1], f64::NEG_INFINITY);
        assert!(values[2].is_nan());
        assert_eq!(values[3], 1500.0);
    }

    #[test]
    fn test_malformed_data_lines_are_skipped() {
        let text = "ok_before 1\n\
                    lonely_name\n\
                    bad_value abc\n\
                    unterminated{a=\"x 1\n\
                    dup{a=\"1\",a=\"2\"} 1\n\
                    reserved{__name__=\"x\"} 1\n\
                    too_many 1 2 3\n\
                    ok_after 2\n";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.skipped_lines, 6);
        let names: Vec<&str> = parsed.families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ok_before", "ok_after"]);
    }

    #[test]
    fn test_unrecognized_comments_are_ignored() {
        let parsed = parse("# scraped by slurmrestd\n#\n# EOF\nm 1\n").unwrap();
        assert_eq!(parsed.families.len(), 1);
        assert!(parsed.families[0].help.is_empty());
    }

    #[test]
    fn test_second_type_line_is_fatal() {
        let err = parse("# TYPE m gauge\nm 1\n# TYPE m counter\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.reason.contains("second TYPE"));
    }

    #[test]
    fn test_second_help_line_is_fatal() {
        let err = parse("# HELP m one\n# HELP m two\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let err = parse("# TYPE m gaugehistogram\n").unwrap_err();
        assert!(err.reason.contains("unknown metric type"));
    }

    #[test]
    fn test_help_text_unescaped() {
        let parsed = parse("# HELP m first\\nsecond \\\\ end\n").unwrap();
        assert_eq!(parsed.families[0].help, "first\nsecond \\ end");
    }

    #[test]
    fn test_non_contiguous_samples_append_to_family() {
        let parsed = parse("a 1\nb 2\na{x=\"y\"} 3\n").unwrap();
        assert_eq!(parsed.families.len(), 2);
        assert_eq!(parsed.families[0].samples.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_reports_line() {
        let body = b"a 1\nb 2\n\xff\xfe 3\n";
        let err = parse_bytes(body).unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_metric_name("slurm:jobs_total"));
        assert!(!is_valid_metric_name("1abc"));
        assert!(is_valid_label_name("_cluster"));
        assert!(!is_valid_label_name("cluster-name"));
        assert!(!is_valid_label_name(""));
    }
}
