//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with the exporter endpoints and the scraped upstream endpoints.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let uptime_str = format!(
        "{}h {}m {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60
    );

    let upstream_rows: String = state
        .aggregator
        .endpoints()
        .iter()
        .map(|endpoint| {
            format!(
                "        <tr><td>{}</td><td><code>{}</code></td></tr>\n",
                html_escape(&endpoint.name),
                html_escape(&state.aggregator.fetcher().url_for(endpoint))
            )
        })
        .collect();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Slurm Metrics Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; line-height: 1.6; }}
        .container {{ max-width: 900px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); }}
        h1 {{ color: #333; border-bottom: 3px solid #2e7d32; padding-bottom: 15px; }}
        h2 {{ color: #555; margin-top: 30px; }}
        .info {{ background: #e9ecef; padding: 15px; border-radius: 4px; }}
        .endpoint-list li {{ margin: 10px 0; }}
        a {{ color: #2e7d32; font-weight: 600; text-decoration: none; }}
        table {{ border-collapse: collapse; width: 100%; }}
        td {{ border-bottom: 1px solid #ddd; padding: 6px; }}
        code {{ background: #e9ecef; padding: 2px 6px; border-radius: 3px; }}
        .footer {{ margin-top: 40px; border-top: 1px solid #ddd; color: #666; font-size: 0.9em; text-align: center; }}
    </style>
</head>
<body>
<div class="container">
    <h1>Slurm Metrics Exporter</h1>
    <div class="info">
        Version <strong>{version}</strong> ({commit}) &middot; Uptime <strong>{uptime}</strong>
    </div>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
        <li><a href="/metrics">/metrics</a> - merged upstream metrics and exporter self-metrics</li>
        <li><a href="/health">/health</a> - exporter internal health &amp; scrape statistics (text)</li>
        <li><a href="/config">/config</a> - active runtime configuration (read-only)</li>
    </ul>

    <h2>Upstream Endpoints</h2>
    <table>
{upstream_rows}    </table>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = state.build_info.version,
        commit = html_escape(&state.build_info.git_commit),
        uptime = uptime_str,
        upstream_rows = upstream_rows,
        footer = FOOTER_TEXT
    );

    Html(html)
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
