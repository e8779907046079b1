//! Compile command implementation

use std::io::Write;
use std::path::Path;

use miette::{IntoDiagnostic, Result};
use spielplatz_bridge::Backend;
use tracing::info;

use super::{engine_loader, load_config, read_source};
use crate::cli::Cli;

pub fn run_compile(cli: &Cli, file: &Path, backend_id: &str, output: Option<&Path>) -> Result<u8> {
    let config = load_config(cli)?;
    let source = read_source(file)?;
    let mut backend = Backend::new(engine_loader(&config)?, &config);

    compile_source(
        &mut backend,
        &source,
        backend_id,
        output,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr(),
    )
}

/// Compiles `source`, writing the generated code to `output` or `out`.
/// Returns 1 if the source did not compile.
pub fn compile_source<O: Write, E: Write>(
    backend: &mut Backend,
    source: &str,
    backend_id: &str,
    output: Option<&Path>,
    out: &mut O,
    err: &mut E,
) -> Result<u8> {
    let result = backend.compile(source, backend_id).into_diagnostic()?;

    if let Some(error) = result.backend_error() {
        return Err(miette::miette!(
            "Compiling with `{}` failed: {}",
            backend_id,
            error
        ));
    }
    if !result.diagnostics.is_empty() {
        writeln!(err, "{}", result.diagnostics).into_diagnostic()?;
    }

    let Some(code) = result.output() else {
        return Ok(1);
    };
    match output {
        Some(path) => {
            std::fs::write(path, code).into_diagnostic()?;
            info!("Wrote {}", path.display());
        }
        None => out.write_all(code.as_bytes()).into_diagnostic()?,
    }
    Ok(0)
}
