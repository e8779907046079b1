//! Text output formatter

use std::io::Write;
use std::path::Path;

use miette::{IntoDiagnostic, Result};
use spielplatz_bridge::diagnostics::{Diagnostic, DiagnosticLevel, ErrorKind};

pub fn output_text<W: Write>(out: &mut W, path: &Path, diagnostics: &[Diagnostic]) -> Result<()> {
    for diag in diagnostics {
        let level = match diag.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Hint => "hint",
        };
        let kind = match diag.error {
            ErrorKind::None => String::new(),
            ErrorKind::Syntax => "[syntax]".to_string(),
            ErrorKind::Type => "[type]".to_string(),
            ErrorKind::Semantic => "[semantic]".to_string(),
            ErrorKind::Reference => "[reference]".to_string(),
        };
        let start = diag.span.start();
        // Columns are zero-based on the wire.
        writeln!(
            out,
            "{}:{}:{}: {}{}: {}",
            path.display(),
            start.line,
            start.column.saturating_add(1),
            level,
            kind,
            diag.message
        )
        .into_diagnostic()?;
    }

    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    writeln!(
        out,
        "\nFound {} issues ({} errors)",
        diagnostics.len(),
        errors
    )
    .into_diagnostic()?;
    Ok(())
}
