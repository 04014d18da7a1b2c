//! Integration tests for the exporter binary.
//!
//! These tests verify configuration validation, `--show-config` output and
//! the `config` subcommand by invoking the compiled binary.

use std::io::Write;
use tempfile::NamedTempFile;

/// Helper to get the binary path
fn binary_path() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_slurm-metrics-exporter"))
}

fn run(args: &[&str]) -> (bool, String, String) {
    let output = std::process::Command::new(binary_path())
        .args(args)
        .output()
        .expect("Failed to execute command");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn yaml_config(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_default_config_is_valid() {
    let (ok, stdout, stderr) = run(&["--no-config", "--check-config"]);
    assert!(ok, "stdout: '{}', stderr: '{}'", stdout, stderr);
    assert!(stdout.contains("Configuration is valid"));
}

#[test]
fn test_tls_enabled_without_paths() {
    let (ok, stdout, stderr) = run(&["--no-config", "--enable-tls", "--check-config"]);
    assert!(!ok);
    assert!(
        stderr.contains("TLS is enabled but neither cert_file nor key_file are set"),
        "Expected error about missing TLS paths, got stdout: '{}', stderr: '{}'",
        stdout,
        stderr
    );
}

#[test]
fn test_tls_enabled_with_cert_only() {
    let (ok, _, stderr) = run(&[
        "--no-config",
        "--enable-tls",
        "--tls-cert",
        "/some/path.pem",
        "--check-config",
    ]);
    assert!(!ok);
    assert!(stderr.contains("TLS is enabled but key_file is not set"));
}

#[test]
fn test_tls_with_missing_files() {
    let (ok, _, stderr) = run(&[
        "--no-config",
        "--enable-tls",
        "--tls-cert",
        "/nonexistent/cert.pem",
        "--tls-key",
        "/nonexistent/key.pem",
        "--check-config",
    ]);
    assert!(!ok);
    assert!(stderr.contains("TLS certificate file not found"));
}

#[test]
fn test_tls_with_empty_key_file() {
    let mut cert = NamedTempFile::new().unwrap();
    writeln!(cert, "-----BEGIN CERTIFICATE-----").unwrap();
    let key = NamedTempFile::new().unwrap();

    let cert_path = cert.path().to_string_lossy().to_string();
    let key_path = key.path().to_string_lossy().to_string();
    let (ok, _, stderr) = run(&[
        "--no-config",
        "--enable-tls",
        "--tls-cert",
        &cert_path,
        "--tls-key",
        &key_path,
        "--check-config",
    ]);
    assert!(!ok);
    assert!(stderr.contains("TLS private key file is empty"));
}

#[test]
fn test_config_file_with_no_enabled_endpoints_is_rejected() {
    let config = yaml_config(
        "upstream:\n  url: http://localhost:6817\nendpoints:\n  - name: jobs\n    path: /metrics/jobs\n    enabled: false\n",
    );
    let path = config.path().to_string_lossy().to_string();

    let (ok, _, stderr) = run(&["--config", &path, "--check-config"]);
    assert!(!ok);
    assert!(stderr.contains("at least one enabled endpoint"));
}

#[test]
fn test_invalid_upstream_url_from_cli() {
    let (ok, _, stderr) = run(&[
        "--no-config",
        "--upstream-url",
        "localhost:6817",
        "--check-config",
    ]);
    assert!(!ok);
    assert!(stderr.contains("upstream.url must start with http:// or https://"));
}

#[test]
fn test_show_config_applies_cli_overrides_and_redacts_password() {
    let config = yaml_config(
        "server:\n  port: 9100\n  basic_auth:\n    enabled: true\n    username: admin\n    password: hunter2\nslurm:\n  url: http://slurm:6817\n  timeout: 5s\nlabels:\n  cluster: c1\n",
    );
    let path = config.path().to_string_lossy().to_string();

    let (ok, stdout, stderr) = run(&["--config", &path, "--port", "9200", "--show-config"]);
    assert!(ok, "stderr: '{}'", stderr);
    assert!(stdout.contains("port: 9200"));
    assert!(stdout.contains("url: http://slurm:6817"));
    assert!(stdout.contains("timeout: 5s"));
    assert!(stdout.contains("cluster: c1"));
    assert!(!stdout.contains("hunter2"));
}

#[test]
fn test_show_config_as_json() {
    let (ok, stdout, _) = run(&["--no-config", "--show-config", "--config-format", "json"]);
    assert!(ok);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["server"]["port"], 8080);
    assert_eq!(value["server"]["scrape_timeout"], "30s");
    assert_eq!(value["endpoints"].as_array().unwrap().len(), 3);
}

#[test]
fn test_config_subcommand_writes_loadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("generated.yaml");
    let target_str = target.to_string_lossy().to_string();

    let (ok, stdout, _) = run(&["config", "-o", &target_str, "--commented"]);
    assert!(ok);
    assert!(stdout.contains("Configuration written to"));

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.starts_with("# Slurm Metrics Exporter Configuration"));

    let (ok, stdout, stderr) = run(&["--config", &target_str, "--check-config"]);
    assert!(ok, "stdout: '{}', stderr: '{}'", stdout, stderr);
}
