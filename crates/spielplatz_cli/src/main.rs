//! Spielplatz CLI
//!
//! Runs, lints and compiles playground programs with the Spielplatz
//! engine from the terminal.

mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging. A worker shares its stderr with the host, so it
    // stays quiet unless asked.
    let filter = match (&cli.command, cli.verbose) {
        (_, true) => EnvFilter::new("debug"),
        (Commands::Worker { .. }, false) => EnvFilter::new("warn"),
        (_, false) => EnvFilter::new("info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    match &cli.command {
        Commands::Lint { file, format } => commands::lint::run_lint(cli, file, *format),
        Commands::Run {
            file,
            backend,
            timeout_ms,
            isolation,
        } => commands::run::run_program(cli, file, backend.as_deref(), *timeout_ms, *isolation),
        Commands::Compile {
            file,
            backend,
            output,
        } => commands::compile::run_compile(cli, file, backend, output.as_deref()),
        Commands::Init { force } => commands::init::run_init(*force).map(|_| 0),
        Commands::Worker {
            memory_max_pages,
            engine_timeout_ms,
        } => commands::worker::run_worker(cli, *memory_max_pages, *engine_timeout_ms).map(|_| 0),
    }
}
