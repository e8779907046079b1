//! # spielplatz_diagnostics
//!
//! Value types exchanged with the Spielplatz language engine.
//!
//! This crate provides:
//! - Source coordinates (`Location`, `Span`)
//! - Static-analysis findings (`Diagnostic`) and their parser
//! - Execution outcomes (`RunResult`, `RuntimeError`, `CompileResult`)
//!
//! Everything here is pure data. Values are produced once per request,
//! never mutated afterwards, and owned by whoever received them.
//!
//! ## Example
//!
//! ```rust
//! use spielplatz_diagnostics::{parse_diagnostics, DiagnosticLevel, ErrorKind};
//!
//! let json = r#"[{
//!     "level": "error",
//!     "error": "syntax",
//!     "message": "expected expression",
//!     "span": {
//!         "start": { "line": 1, "column": 8, "charIndex": 8 },
//!         "end": { "line": 1, "column": 8, "charIndex": 8 }
//!     }
//! }]"#;
//!
//! let diagnostics = parse_diagnostics(json).unwrap();
//! assert_eq!(diagnostics[0].level, DiagnosticLevel::Error);
//! assert_eq!(diagnostics[0].error, ErrorKind::Syntax);
//! assert!(diagnostics[0].span.is_point());
//! ```

mod diagnostic;
mod error;
mod result;
mod span;

pub use diagnostic::{Diagnostic, DiagnosticLevel, ErrorKind, parse_diagnostics};
pub use error::ProtocolError;
pub use result::{CompileResult, Markup, RunResult, RuntimeError, RuntimeErrorKind};
pub use span::{Location, Span};
