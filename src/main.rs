//! slurm-metrics-exporter - version 0.1.0
//!
//! Prometheus aggregation proxy for Slurm metrics endpoints.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod startup_checks;
mod state;

use axum::{middleware, routing::get, Router};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};

use cli::{Args, Commands};
use commands::{command_check, command_config, command_test};
use config::{resolve_config, show_config, validate_effective_config, Config};
use handlers::middleware::{basic_auth, track_requests};
use handlers::{config_handler, health_handler, metrics_handler, root_handler};
use state::{AppState, SharedState};

/// Upper bound for draining in-flight requests on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Initializes tracing logging subsystem with configured level and format.
fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match config.logging.level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if config.logging.is_json() {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!(
        "Logging initialized with level: {} ({})",
        config.logging.level, config.logging.format
    );
    Ok(())
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Builds the HTTP router with all routes and middleware.
fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
}

/// Stops accepting connections once `signal` fires and gives in-flight
/// requests up to `grace` to finish.
async fn drain_on<F>(signal: F, handle: Handle, grace: Duration)
where
    F: std::future::Future<Output = ()>,
{
    signal.await;
    info!(
        "Draining in-flight requests for up to {}s...",
        grace.as_secs()
    );
    handle.graceful_shutdown(Some(grace));
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), *format, *commented),

            Commands::Check { upstream } => {
                let config = resolve_config(&args)?;
                command_check(*upstream, &config).await
            }

            Commands::Test {
                iterations,
                verbose,
            } => {
                let config = load_validated_config(&args)?;
                setup_logging(&config)?;
                command_test(*iterations, *verbose, &config).await
            }
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&config)?;

    info!("Starting slurm-metrics-exporter");

    // reqwest and axum-server pull in different rustls backends, so pick one explicitly
    if tokio_rustls::rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let bind_ip_str = config.server.bind.clone();
    let port = config.server.port;
    let tls = config.server.tls.clone();

    let state = Arc::new(AppState::from_config(config)?);
    info!(
        "Aggregating {} endpoints from {} (scrape timeout {:?})",
        state.aggregator.endpoints().len(),
        state.aggregator.fetcher().base_url(),
        state.aggregator.scrape_timeout()
    );
    if !state.aggregator.fetcher().labels().is_empty() {
        info!(
            "Injecting {} extra labels into every sample",
            state.aggregator.fetcher().labels().len()
        );
    }
    if state.config.server.basic_auth.enabled {
        info!("HTTP basic authentication enabled");
    }

    // Startup probe only warns; scrapes report their own failures
    if let Err(e) = startup_checks::validate_upstream(state.aggregator.fetcher()).await {
        warn!("⚠️  {} - the exporter will start anyway", e);
    }

    // Setup graceful shutdown signal handlers
    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    };

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;
    let app = build_router(state.clone());

    let handle = Handle::new();
    tokio::spawn(drain_on(shutdown_signal, handle.clone(), SHUTDOWN_GRACE));

    let result = if tls.enabled {
        // Paths are present and readable since validate_effective_config() passed
        let (Some(cert_path), Some(key_path)) = (tls.cert_file.as_ref(), tls.key_file.as_ref())
        else {
            return Err("TLS is enabled but cert_file or key_file is not set".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "slurm-metrics-exporter listening on https://{}:{}",
            bind_ip_str, port
        );

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
    } else {
        info!(
            "slurm-metrics-exporter listening on http://{}:{}",
            bind_ip_str, port
        );

        axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await
    };

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("slurm-metrics-exporter stopped gracefully");
    Ok(())
}
