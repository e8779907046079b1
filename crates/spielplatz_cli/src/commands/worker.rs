//! Worker command implementation
//!
//! Hosts one execution context over stdin/stdout for process isolation.
//! Stdout carries protocol frames only; logs go to stderr.

use miette::{IntoDiagnostic, Result};
use spielplatz_bridge::{BridgeConfig, serve_stdio};

use super::engine_loader;
use crate::cli::Cli;

pub fn run_worker(
    cli: &Cli,
    memory_max_pages: Option<u32>,
    engine_timeout_ms: Option<u64>,
) -> Result<()> {
    let engine = cli
        .engine
        .clone()
        .ok_or_else(|| miette::miette!("The worker requires --engine"))?;

    let defaults = BridgeConfig::new();
    let config = BridgeConfig {
        engine: Some(engine),
        memory_max_pages: memory_max_pages.unwrap_or(defaults.memory_max_pages),
        engine_timeout_ms,
        ..defaults
    };

    let loader = engine_loader(&config)?;
    serve_stdio(loader, std::io::stdin().lock(), std::io::stdout()).into_diagnostic()
}
