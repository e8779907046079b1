//! Protocol error types.

use thiserror::Error;

/// A payload that does not match the engine or bridge wire contract.
///
/// Protocol errors are never tolerated silently and never retried; they
/// are reported to whoever initiated the call that produced the payload.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON or does not match the schema.
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A span whose end lies before its start.
    #[error("Span end (char {end}) precedes its start (char {start})")]
    InvertedSpan {
        /// Start character index.
        start: u32,
        /// End character index.
        end: u32,
    },

    /// A structurally valid JSON value that is not a known message.
    #[error("Malformed message: {0}")]
    Message(String),
}

impl ProtocolError {
    /// Creates a malformed message error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
