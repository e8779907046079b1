//! Execution and compilation outcomes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ProtocolError;

/// Pre-rendered diagnostics markup owned by the engine.
///
/// The bridge treats this as an opaque string: it is carried to the
/// surface untouched and never parsed. A `null` value from the engine
/// decodes to empty markup; an absent key is an error where the reply
/// schema requires one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Markup(String);

impl Markup {
    /// Wraps rendered markup.
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    /// Returns the markup text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the engine rendered nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the wrapper.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Markup {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self(Option::<String>::deserialize(deserializer)?.unwrap_or_default()))
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Markup {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Why the VM aborted a program.
///
/// Adding a kind changes the contract for every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuntimeErrorKind {
    /// The call stack grew past its limit.
    StackOverflow,
    /// An arithmetic fault such as division by zero.
    Arithmetic,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StackOverflow => "stack overflow",
            Self::Arithmetic => "arithmetic error",
        })
    }
}

/// Abnormal termination of a user program.
///
/// This is data inside a successful run, not a failure of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeError {
    /// Classification of the abort.
    pub kind: RuntimeErrorKind,
    /// Engine-provided description.
    pub message: String,
}

impl RuntimeError {
    /// Creates a runtime error.
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of running a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Exit code. `None` when the program never got to run (for
    /// example because analysis reported errors).
    #[serde(default)]
    pub code: Option<i64>,

    /// Set when the VM aborted execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<RuntimeError>,

    /// Rendered diagnostics from analysis and execution.
    #[serde(deserialize_with = "required_markup")]
    pub diagnostics: Markup,
}

/// Markup key that must be present but may be `null`.
fn required_markup<'de, D>(deserializer: D) -> Result<Markup, D::Error>
where
    D: Deserializer<'de>,
{
    Markup::deserialize(deserializer)
}

impl RunResult {
    /// A program that exited on its own.
    pub fn exited(code: i64, diagnostics: Markup) -> Self {
        Self {
            code: Some(code),
            runtime_error: None,
            diagnostics,
        }
    }

    /// A program the VM aborted.
    pub fn aborted(error: RuntimeError, diagnostics: Markup) -> Self {
        Self {
            code: None,
            runtime_error: Some(error),
            diagnostics,
        }
    }

    /// A program that was rejected before execution.
    pub fn rejected(diagnostics: Markup) -> Self {
        Self {
            code: None,
            runtime_error: None,
            diagnostics,
        }
    }

    /// Parses the execution entry point's reply.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Exit code, only when the program terminated normally.
    ///
    /// Once a runtime error is present the code carries no meaning.
    pub fn exit_code(&self) -> Option<i64> {
        match self.runtime_error {
            Some(_) => None,
            None => self.code,
        }
    }

    /// Returns true if the program ran to completion without an abort.
    pub fn exited_normally(&self) -> bool {
        self.exit_code().is_some()
    }
}

/// Outcome of compiling a program with a compiling backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    /// Whether compilation failed.
    pub failed: bool,

    /// Rendered diagnostics.
    #[serde(default)]
    pub diagnostics: Markup,

    /// Generated code. Not meaningful when `failed` is set.
    #[serde(default)]
    pub output: String,

    /// Failure unrelated to the source, such as an unknown backend.
    #[serde(default)]
    pub error: String,
}

impl CompileResult {
    /// Parses the compile entry point's reply.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Generated code, if compilation succeeded.
    pub fn output(&self) -> Option<&str> {
        (!self.failed).then_some(self.output.as_str())
    }

    /// Non-diagnostic failure text, if any.
    pub fn backend_error(&self) -> Option<&str> {
        (!self.error.is_empty()).then_some(self.error.as_str())
    }
}
