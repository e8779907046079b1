//! JSON output formatter

use std::io::Write;
use std::path::Path;

use miette::{IntoDiagnostic, Result};
use spielplatz_bridge::diagnostics::Diagnostic;

pub fn output_json<W: Write>(out: &mut W, path: &Path, diagnostics: &[Diagnostic]) -> Result<()> {
    let output = serde_json::json!({
        "path": path.display().to_string(),
        "diagnostics": diagnostics,
    });
    writeln!(
        out,
        "{}",
        serde_json::to_string_pretty(&output).into_diagnostic()?
    )
    .into_diagnostic()?;
    Ok(())
}
