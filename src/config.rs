//! Configuration management for slurm-metrics-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use serde::{Deserialize, Serialize};
use slurm_metrics_exporter::{EndpointSpec, ExtraLabels, LabelError, UpstreamSettings};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:6817";
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_CONFIG_LOCATIONS: [&str; 3] = [
    "/etc/slurm-metrics-exporter/config.yaml",
    "./slurm-metrics-exporter.yaml",
    "./config.yaml",
];

const VALID_LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// HTTP basic authentication settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// HTTPS settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
}

/// Listener settings of the exporter itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for one whole scrape across all endpoints.
    #[serde(default = "default_scrape_timeout", with = "duration_str")]
    pub scrape_timeout: Duration,
    #[serde(default)]
    pub basic_auth: BasicAuthConfig,
    #[serde(default, alias = "ssl")]
    pub tls: TlsConfig,
}

fn default_bind() -> String {
    DEFAULT_BIND_ADDR.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_scrape_timeout() -> Duration {
    DEFAULT_SCRAPE_TIMEOUT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            scrape_timeout: default_scrape_timeout(),
            basic_auth: BasicAuthConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Upstream Slurm exporter connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Per-request timeout.
    #[serde(default = "default_upstream_timeout", with = "duration_str")]
    pub timeout: Duration,
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}
fn default_upstream_timeout() -> Duration {
    DEFAULT_UPSTREAM_TIMEOUT
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout: default_upstream_timeout(),
            tls_insecure_skip_verify: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format", alias = "output")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Effective exporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, alias = "slurm")]
    pub upstream: UpstreamConfig,
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_endpoints() -> Vec<EndpointSpec> {
    vec![
        EndpointSpec::new("jobs", "/metrics/jobs"),
        EndpointSpec::new("nodes", "/metrics/nodes"),
        EndpointSpec::new("partitions", "/metrics/partitions"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            endpoints: default_endpoints(),
            labels: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Endpoints that take part in scrapes, in declaration order.
    pub fn enabled_endpoints(&self) -> Vec<EndpointSpec> {
        self.endpoints.iter().filter(|e| e.enabled).cloned().collect()
    }

    pub fn extra_labels(&self) -> Result<ExtraLabels, LabelError> {
        ExtraLabels::new(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    pub fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            base_url: self.upstream.url.clone(),
            timeout: self.upstream.timeout,
            tls_insecure_skip_verify: self.upstream.tls_insecure_skip_verify,
        }
    }

    /// Copy safe to expose over HTTP.
    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        if !config.server.basic_auth.password.is_empty() {
            config.server.basic_auth.password = "********".to_string();
        }
        config
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // Upstream validation
    let url = cfg.upstream.url.trim();
    if url.is_empty() {
        return Err("upstream.url is required".into());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!(
            "upstream.url must start with http:// or https:// (got '{}')",
            url
        )
        .into());
    }
    if cfg.upstream.timeout.is_zero() {
        return Err("upstream.timeout must be greater than zero".into());
    }

    // Server validation
    if cfg.server.port == 0 {
        return Err("server.port must be between 1 and 65535".into());
    }
    if cfg.server.scrape_timeout.is_zero() {
        return Err("server.scrape_timeout must be greater than zero".into());
    }

    let auth = &cfg.server.basic_auth;
    if auth.enabled && (auth.username.is_empty() || auth.password.is_empty()) {
        return Err("basic auth is enabled but username or password is empty".into());
    }

    // TLS validation
    if cfg.server.tls.enabled {
        let cert_path = cfg.server.tls.cert_file.as_deref();
        let key_path = cfg.server.tls.key_file.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err("TLS is enabled but neither cert_file nor key_file are set".into());
            }
            (Some(_), None) => {
                return Err("TLS is enabled but key_file is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but cert_file is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    // Endpoint validation
    if cfg.endpoints.iter().all(|e| !e.enabled) {
        return Err("at least one enabled endpoint must be configured".into());
    }
    let mut names = HashSet::new();
    for (i, endpoint) in cfg.endpoints.iter().enumerate() {
        if endpoint.name.trim().is_empty() {
            return Err(format!("endpoint {}: name is required", i).into());
        }
        if endpoint.path.trim().is_empty() {
            return Err(format!("endpoint {} ('{}'): path is required", i, endpoint.name).into());
        }
        if !names.insert(endpoint.name.as_str()) {
            return Err(format!("duplicate endpoint name '{}'", endpoint.name).into());
        }
    }

    // Label validation
    cfg.extra_labels()
        .map_err(|e| format!("invalid labels: {}", e))?;

    // Logging validation
    if !VALID_LOG_LEVELS.contains(&cfg.logging.level.to_ascii_lowercase().as_str()) {
        return Err(format!(
            "logging.level must be one of: {} (got '{}')",
            VALID_LOG_LEVELS.join(", "),
            cfg.logging.level
        )
        .into());
    }
    match cfg.logging.format.to_ascii_lowercase().as_str() {
        "text" | "json" => {}
        other => {
            return Err(
                format!("logging.format must be 'text' or 'json' (got '{}')", other).into(),
            );
        }
    }

    Ok(())
}

/// Checks that a TLS file exists, is readable and not empty.
fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    let file = Path::new(path);
    if !file.exists() {
        return Err(format!("TLS {} file not found: {}", what, path).into());
    }
    match fs::metadata(file) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", what, path).into()),
        Err(e) => {
            Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into())
        }
        Ok(_) => Ok(()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Server overrides
    if let Some(bind_ip) = args.bind {
        config.server.bind = bind_ip.to_string();
    }
    if let Some(cli_port) = args.port {
        config.server.port = cli_port;
    }

    if let Some(url) = &args.upstream_url {
        config.upstream.url = url.clone();
    }

    // Logging overrides
    if let Some(level) = args.log_level {
        config.logging.level = level.as_str().to_string();
    }
    if let Some(format) = args.log_format {
        config.logging.format = format.as_str().to_string();
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.server.tls.enabled = true;
    }
    if let Some(cert_path) = &args.tls_cert {
        config.server.tls.cert_file = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.server.tls.key_file = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Loads a config file, picking the format from its extension.
///
/// Without an explicit path the default locations are tried in order; if
/// none exists the built-in defaults are used. An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
        {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Serializes a configuration in the requested format.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(&config.redacted(), format)?;
    println!("{output}");
    Ok(())
}

/// Go-style duration strings such as `500ms`, `10s` or `1m30s`.
pub mod duration_str {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(serde::de::Error::custom)
    }

    /// Parses a sequence of `<number><unit>` pairs. Units: ns, us, µs, ms, s, m, h.
    pub fn parse_duration(input: &str) -> Result<Duration, String> {
        let text = input.trim();
        if text.is_empty() {
            return Err("empty duration".to_string());
        }
        if text == "0" {
            return Ok(Duration::ZERO);
        }

        let mut total = 0f64;
        let mut rest = text;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            if number_len == 0 {
                return Err(format!("invalid duration '{}'", input));
            }
            let value: f64 = rest[..number_len]
                .parse()
                .map_err(|_| format!("invalid duration '{}'", input))?;
            rest = &rest[number_len..];

            let unit_len = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let scale = match &rest[..unit_len] {
                "ns" => 1e-9,
                "us" | "µs" => 1e-6,
                "ms" => 1e-3,
                "s" => 1.0,
                "m" => 60.0,
                "h" => 3600.0,
                "" => return Err(format!("missing unit in duration '{}'", input)),
                unit => return Err(format!("unknown unit '{}' in duration '{}'", unit, input)),
            };
            rest = &rest[unit_len..];
            total += value * scale;
        }

        Duration::try_from_secs_f64(total)
            .map_err(|_| format!("duration '{}' out of range", input))
    }

    /// Formats a duration the way `parse_duration` reads it back.
    pub fn format_duration(duration: Duration) -> String {
        if duration.is_zero() {
            return "0s".to_string();
        }
        if duration.subsec_nanos() != 0 && duration.as_secs() == 0 {
            let nanos = duration.subsec_nanos();
            return if nanos % 1_000_000 == 0 {
                format!("{}ms", nanos / 1_000_000)
            } else if nanos % 1_000 == 0 {
                format!("{}us", nanos / 1_000)
            } else {
                format!("{}ns", nanos)
            };
        }

        let secs = duration.as_secs();
        let mut out = String::new();
        if secs >= 3600 {
            out.push_str(&format!("{}h", secs / 3600));
        }
        if secs % 3600 >= 60 {
            out.push_str(&format!("{}m", (secs % 3600) / 60));
        }
        let millis = duration.subsec_millis();
        if secs % 60 != 0 || millis != 0 {
            if millis == 0 {
                out.push_str(&format!("{}s", secs % 60));
            } else {
                out.push_str(&format!("{}.{:03}s", secs % 60, millis));
            }
        }
        out
    }
}
