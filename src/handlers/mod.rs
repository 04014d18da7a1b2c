//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Landing page
//! - `/metrics`: Merged upstream metrics plus exporter self-metrics
//! - `/health`: Health check endpoint
//! - `/config`: Configuration display endpoint
//!
//! and the `middleware` applied to every route.

pub mod config;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod root;

// Re-export handlers
pub use config::config_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;
