//! Command implementations

pub mod compile;
pub mod init;
pub mod lint;
pub mod run;
pub mod worker;

use std::path::Path;
use std::sync::Arc;

use miette::{IntoDiagnostic, Result, WrapErr};
use spielplatz_bridge::BridgeConfig;
use spielplatz_engine::{EngineLoader, WasmEngineLoader, WasmEngineOptions};
use tracing::info;

use crate::cli::Cli;

/// Loads the configuration and applies global command-line overrides.
pub fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = if let Some(ref path) = cli.config {
        BridgeConfig::from_file(path).into_diagnostic()?
    } else {
        find_config()?
    };

    if let Some(ref engine) = cli.engine {
        config.engine = Some(engine.clone());
        config.base_dir = None;
    }
    Ok(config)
}

pub fn find_config() -> Result<BridgeConfig> {
    if let Some(path) = BridgeConfig::discover(".") {
        info!("Using config: {}", path.display());
        return BridgeConfig::from_file(&path).into_diagnostic();
    }

    info!("No config file found, using defaults");
    Ok(BridgeConfig::new())
}

/// Builds the engine loader described by `config`.
pub fn engine_loader(config: &BridgeConfig) -> Result<Arc<dyn EngineLoader>> {
    let path = config.engine_path().ok_or_else(|| {
        miette::miette!(
            help = "pass --engine or set \"engine\" in .spielplatz.jsonc",
            "No engine module configured"
        )
    })?;

    if !path.is_file() {
        return Err(miette::miette!(
            "Engine module not found: {}",
            path.display()
        ));
    }

    let options = WasmEngineOptions {
        memory_max_pages: config.memory_max_pages,
        timeout_ms: config.engine_timeout_ms,
    };
    Ok(Arc::new(WasmEngineLoader::from_file(path).with_options(options)))
}

/// Reads a source file.
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read {}", path.display()))
}

/// Maps a program exit code onto a process exit status.
pub fn exit_status(code: i64) -> u8 {
    code.rem_euclid(256) as u8
}
