//! Run command implementation

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use spielplatz_bridge::{
    Backend, BridgeConfig, BridgeError, Isolation, ProcessCommand, ProcessContextFactory,
};
use tracing::{debug, warn};

use super::{engine_loader, exit_status, load_config, read_source};
use crate::cli::{Cli, IsolationArg};

/// Exit status for a program the VM aborted (`EX_SOFTWARE`).
pub const RUNTIME_ERROR_EXIT: u8 = 70;
/// Exit status when the engine itself failed.
pub const ENGINE_FAILURE_EXIT: u8 = 2;
/// Exit status for a program rejected before it ran.
pub const REJECTED_EXIT: u8 = 1;

pub fn run_program(
    cli: &Cli,
    file: &Path,
    backend_id: Option<&str>,
    timeout_ms: Option<u64>,
    isolation: Option<IsolationArg>,
) -> Result<u8> {
    let mut config = load_config(cli)?;
    if let Some(ms) = timeout_ms {
        config.run_timeout_ms = Some(ms);
    }
    if let Some(isolation) = isolation {
        config.isolation = isolation.into();
    }

    let source = read_source(file)?;
    let loader = engine_loader(&config)?;
    let backend = match config.isolation {
        Isolation::Thread => Backend::new(loader, &config),
        Isolation::Process => {
            let factory = ProcessContextFactory::new(worker_command(&config, cli.verbose)?);
            Backend::with_factory(loader, Arc::new(factory), &config)
        }
    };
    let backend_id = backend_id.unwrap_or(backend.default_backend()).to_string();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(execute(
        &backend,
        &source,
        &backend_id,
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    ))
}

/// Command line that starts this binary as a context process.
fn worker_command(config: &BridgeConfig, verbose: bool) -> Result<ProcessCommand> {
    let exe = std::env::current_exe().into_diagnostic()?;
    let engine = config
        .engine_path()
        .ok_or_else(|| miette::miette!("No engine module configured"))?;

    let mut command = ProcessCommand::new(exe)
        .arg("worker")
        .arg("--engine")
        .arg(engine)
        .arg("--memory-max-pages")
        .arg(config.memory_max_pages.to_string());
    if let Some(ms) = config.engine_timeout_ms {
        command = command.arg("--engine-timeout-ms").arg(ms.to_string());
    }
    if verbose {
        command = command.arg("--verbose");
    }
    Ok(command)
}

/// Runs `source`, streaming program output to `out` and diagnostics to
/// `err`. Returns the process exit status.
pub async fn execute<O: Write, E: Write>(
    backend: &Backend,
    source: &str,
    backend_id: &str,
    out: &mut O,
    err: &mut E,
) -> Result<u8> {
    let mut write_error = None;
    let outcome = backend
        .run(source, backend_id, |chunk| {
            if write_error.is_some() {
                return;
            }
            if let Err(e) = out.write_all(chunk.as_bytes()).and_then(|()| out.flush()) {
                write_error = Some(e);
            }
        })
        .await;

    if let Some(e) = write_error {
        warn!("Program output was cut short: {}", e);
    }

    let result = match outcome {
        Ok(result) => result,
        Err(BridgeError::EngineFailure(message)) => {
            writeln!(err, "engine failure: {message}").into_diagnostic()?;
            return Ok(ENGINE_FAILURE_EXIT);
        }
        Err(e) => return Err(e).into_diagnostic(),
    };

    if !result.diagnostics.is_empty() {
        writeln!(err, "{}", result.diagnostics).into_diagnostic()?;
    }
    if let Some(ref runtime_error) = result.runtime_error {
        writeln!(err, "runtime error: {runtime_error}").into_diagnostic()?;
        return Ok(RUNTIME_ERROR_EXIT);
    }

    debug!(code = ?result.code, "Program finished");
    Ok(result.code.map_or(REJECTED_EXIT, exit_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use spielplatz_engine::test_utils::ScriptEngineLoader;

    struct Outcome {
        status: u8,
        stdout: String,
        stderr: String,
    }

    async fn execute_script(source: &str, backend_id: &str) -> Outcome {
        let backend = Backend::new(Arc::new(ScriptEngineLoader::new()), &BridgeConfig::new());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let status = execute(&backend, source, backend_id, &mut stdout, &mut stderr)
            .await
            .unwrap();

        Outcome {
            status,
            stdout: String::from_utf8(stdout).unwrap(),
            stderr: String::from_utf8(stderr).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_output_and_exit_code() {
        let outcome = execute_script("println hello; print world; exit 3", "vm").await;

        assert_eq!(outcome.stdout, "hello\nworld");
        assert_eq!(outcome.status, 3);
        assert_eq!(outcome.stderr, "");
    }

    #[tokio::test]
    async fn test_runtime_error_exit() {
        let outcome = execute_script("print before; recurse", "vm").await;

        assert_eq!(outcome.stdout, "before");
        assert_eq!(outcome.status, RUNTIME_ERROR_EXIT);
        assert!(outcome.stderr.contains("runtime error: stack overflow"), "{}", outcome.stderr);
    }

    #[tokio::test]
    async fn test_rejected_program_prints_markup() {
        let outcome = execute_script("let x = ", "vm").await;

        assert_eq!(outcome.status, REJECTED_EXIT);
        assert!(outcome.stderr.contains("<b>error</b>"), "{}", outcome.stderr);
    }

    #[tokio::test]
    async fn test_engine_failure_exit() {
        let outcome = execute_script("print 1", "jit").await;

        assert_eq!(outcome.status, ENGINE_FAILURE_EXIT);
        assert!(outcome.stderr.contains("unknown backend `jit`"), "{}", outcome.stderr);
    }

    #[test]
    fn test_worker_command_forwards_limits() {
        let config = BridgeConfig {
            engine: Some("engine.wasm".into()),
            memory_max_pages: 64,
            engine_timeout_ms: Some(500),
            ..BridgeConfig::new()
        };

        let command = worker_command(&config, false).unwrap();

        assert_eq!(
            command,
            ProcessCommand::new(std::env::current_exe().unwrap()).args([
                "worker",
                "--engine",
                "engine.wasm",
                "--memory-max-pages",
                "64",
                "--engine-timeout-ms",
                "500",
            ])
        );
    }
}
