//! Diagnostic types for static-analysis findings.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{ProtocolError, Span};

/// How urgent a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Suggestion that does not indicate a problem.
    Hint,
    /// Informational message.
    Info,
    /// Should be reviewed.
    Warning,
    /// The program cannot run as written.
    Error,
}

/// Which stage of analysis produced an error.
///
/// Independent from [`DiagnosticLevel`]: hints and infos usually carry
/// `ErrorKind::None`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Not an error.
    #[default]
    None,
    /// The source does not parse.
    Syntax,
    /// Type checking failed.
    Type,
    /// Any other semantic violation.
    Semantic,
    /// An unresolved name.
    Reference,
}

/// A single finding reported by the engine's analysis entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level.
    pub level: DiagnosticLevel,

    /// Error classification. The engine writes `null` for non-errors.
    #[serde(deserialize_with = "error_kind_or_null")]
    pub error: ErrorKind,

    /// Human-readable message.
    pub message: String,

    /// Where in the source the finding applies.
    pub span: Span,
}

fn error_kind_or_null<'de, D>(deserializer: D) -> Result<ErrorKind, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ErrorKind>::deserialize(deserializer)?.unwrap_or_default())
}

impl Diagnostic {
    /// Creates a new diagnostic without an error classification.
    pub fn new(level: DiagnosticLevel, message: impl Into<String>, span: Span) -> Self {
        Self {
            level,
            error: ErrorKind::None,
            message: message.into(),
            span,
        }
    }

    /// Creates an error-level diagnostic of the given kind.
    pub fn error(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self::new(DiagnosticLevel::Error, message, span).with_error(kind)
    }

    /// Sets the error classification.
    pub fn with_error(mut self, error: ErrorKind) -> Self {
        self.error = error;
        self
    }

    /// Returns true for error-level diagnostics.
    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

/// Parses the analysis entry point's reply.
///
/// The payload must be a JSON array of diagnostic objects. Order is kept
/// exactly as the engine reported it.
pub fn parse_diagnostics(json: &str) -> Result<Vec<Diagnostic>, ProtocolError> {
    Ok(serde_json::from_str(json)?)
}
