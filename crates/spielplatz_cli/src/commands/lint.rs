//! Lint command implementation

use std::io::Write;
use std::path::Path;

use miette::{IntoDiagnostic, Result};
use spielplatz_bridge::Backend;
use tracing::debug;

use super::{engine_loader, load_config, read_source};
use crate::cli::{Cli, OutputFormat};
use crate::output::output_diagnostics;

pub fn run_lint(cli: &Cli, file: &Path, format: OutputFormat) -> Result<u8> {
    let config = load_config(cli)?;
    let source = read_source(file)?;
    let mut backend = Backend::new(engine_loader(&config)?, &config);

    let has_errors = lint_source(
        &mut backend,
        file,
        &source,
        format,
        &mut std::io::stdout().lock(),
    )?;
    Ok(u8::from(has_errors))
}

/// Lints `source` and writes the findings. Returns true if any finding is
/// an error.
pub fn lint_source<W: Write>(
    backend: &mut Backend,
    path: &Path,
    source: &str,
    format: OutputFormat,
    out: &mut W,
) -> Result<bool> {
    let diagnostics = backend.lint(source).into_diagnostic()?;
    debug!("{}: {} diagnostic(s)", path.display(), diagnostics.len());
    output_diagnostics(out, path, &diagnostics, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spielplatz_bridge::BridgeConfig;
    use spielplatz_engine::test_utils::ScriptEngineLoader;
    use std::sync::Arc;

    fn lint(source: &str, format: OutputFormat) -> (bool, String) {
        let mut backend = Backend::new(Arc::new(ScriptEngineLoader::new()), &BridgeConfig::new());
        let mut out = Vec::new();
        let has_errors =
            lint_source(&mut backend, Path::new("main.sp"), source, format, &mut out).unwrap();
        (has_errors, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_clean_program() {
        let (has_errors, out) = lint("let x = 1; print x", OutputFormat::Text);

        assert!(!has_errors);
        assert!(out.contains("Found 0 issues"), "{out}");
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let (has_errors, out) = lint("let x = ", OutputFormat::Text);

        assert!(has_errors);
        assert!(out.contains("error[syntax]"), "{out}");
    }

    #[test]
    fn test_hint_is_not_an_error() {
        let (has_errors, out) = lint("print", OutputFormat::Json);

        assert!(!has_errors);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["diagnostics"][0]["level"], "hint");
    }
}
