//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::default();
    config
        .labels
        .insert("cluster".to_string(), "default".to_string());

    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Yaml => "slurm-metrics-exporter.yaml",
            ConfigFormat::Json => "slurm-metrics-exporter.json",
            ConfigFormat::Toml => "slurm-metrics-exporter.toml",
        }),
    };

    let mut content = render_config(&config, format)?;
    if commented && format == ConfigFormat::Yaml {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Slurm Metrics Exporter Configuration
# ====================================
#
# Server
# ------
# server.bind: "0.0.0.0"             # Bind IP (0.0.0.0 = all interfaces)
# server.port: 8080                  # HTTP port
# server.scrape_timeout: "30s"       # Upper bound for one scrape of all endpoints
# server.basic_auth.enabled: false   # Require HTTP basic auth on every endpoint
# server.basic_auth.username: ""
# server.basic_auth.password: ""
# server.tls.enabled: false          # Serve HTTPS (alias: server.ssl)
# server.tls.cert_file: null         # Path to TLS certificate (PEM format)
# server.tls.key_file: null          # Path to TLS private key (PEM format)
#
# Upstream (alias: slurm)
# -----------------------
# upstream.url: "http://localhost:6817"   # Base URL of the Slurm exporter
# upstream.timeout: "10s"                 # Per-request timeout (500ms, 10s, 1m30s)
# upstream.tls_insecure_skip_verify: false
#
# Endpoints
# ---------
# Each endpoint is fetched from <upstream.url><path>. Output keeps this order.
#   - name: jobs
#     path: /metrics/jobs
#     enabled: true
#
# Labels
# ------
# Added to every sample; they replace upstream labels with the same name.
#   cluster: "c1"
#
# Logging
# -------
# logging.level: "info"              # off, error, warn, info, debug, trace
# logging.format: "text"             # text or json (alias: output)
"#;

    format!("{comments}\n{yaml}")
}
