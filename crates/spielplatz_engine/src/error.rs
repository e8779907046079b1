//! Engine error types.

use spielplatz_diagnostics::ProtocolError;
use thiserror::Error;

/// Errors that can occur while talking to the engine.
///
/// None of these describe a crash of the user program: those are
/// reported as a `RuntimeError` inside a successful `RunResult`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An entry point was called before the engine finished loading.
    #[error("Engine is not initialized")]
    NotInitialized,

    /// Failed to load the engine module.
    #[error("Failed to load engine: {0}")]
    Load(String),

    /// The engine call itself failed.
    #[error("Engine call `{entry}` failed: {message}")]
    Call {
        /// Entry point that was called.
        entry: &'static str,
        /// Failure reported by the runtime.
        message: String,
    },

    /// The engine replied with data that does not match the schema.
    #[error("Engine returned a malformed `{entry}` reply: {source}")]
    MalformedReply {
        /// Entry point that produced the reply.
        entry: &'static str,
        /// Why the reply was rejected.
        #[source]
        source: ProtocolError,
    },

    /// The engine does not export the requested entry point.
    #[error("Engine does not support `{0}`")]
    Unsupported(&'static str),

    /// The call was aborted through an interrupt handle.
    #[error("Engine call was interrupted")]
    Interrupted,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a load error.
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }

    /// Creates a call error.
    pub fn call(entry: &'static str, message: impl Into<String>) -> Self {
        Self::Call {
            entry,
            message: message.into(),
        }
    }

    /// Creates a malformed reply error.
    pub fn malformed(entry: &'static str, source: ProtocolError) -> Self {
        Self::MalformedReply { entry, source }
    }
}
