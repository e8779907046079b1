//! Output formatting module

mod json;
mod text;

use std::io::Write;
use std::path::Path;

use miette::Result;
use spielplatz_bridge::diagnostics::Diagnostic;

use crate::cli::OutputFormat;

/// Writes diagnostics for `path` and reports whether any is an error.
pub fn output_diagnostics<W: Write>(
    out: &mut W,
    path: &Path,
    diagnostics: &[Diagnostic],
    format: OutputFormat,
) -> Result<bool> {
    let has_errors = diagnostics.iter().any(Diagnostic::is_error);

    match format {
        OutputFormat::Json => json::output_json(out, path, diagnostics)?,
        OutputFormat::Text => text::output_text(out, path, diagnostics)?,
    }

    Ok(has_errors)
}
