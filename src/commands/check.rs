//! Check command implementation.
//!
//! Validates configuration and, on request, upstream connectivity.

use slurm_metrics_exporter::OutcomeStatus;

use crate::config::{validate_effective_config, Config};
use crate::startup_checks::validate_upstream;
use crate::state::AppState;

/// Validates configuration and optionally the upstream endpoints.
pub async fn command_check(
    upstream: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Slurm Metrics Exporter - System Check");
    println!("========================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
            println!(
                "   ✅ {} of {} endpoints enabled",
                config.enabled_endpoints().len(),
                config.endpoints.len()
            );
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    if upstream && all_ok {
        println!("\n🌐 Checking upstream {}...", config.upstream.url);
        let state = AppState::from_config(config.clone())?;

        match validate_upstream(state.aggregator.fetcher()).await {
            Ok(()) => println!("   ✅ Upstream reachable"),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }

        println!("\n📊 Scraping enabled endpoints...");
        let report = state.aggregator.scrape().await;
        for outcome in &report.outcomes {
            match &outcome.status {
                OutcomeStatus::Success { families } => println!(
                    "   ✅ {}: {} families in {:.1}ms",
                    outcome.endpoint,
                    families,
                    outcome.elapsed.as_secs_f64() * 1000.0
                ),
                OutcomeStatus::Failure { message, .. } => {
                    println!("   ❌ {}: {}", outcome.endpoint, message);
                    all_ok = false;
                }
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - exporter is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}
