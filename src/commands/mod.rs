//! CLI command implementations for slurm-metrics-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Configuration and upstream validation
//! - `config`: Configuration file generation
//! - `test`: Scrape testing against the live upstream

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use test::command_test;
