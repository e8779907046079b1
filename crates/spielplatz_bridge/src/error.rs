//! Bridge error types.

use std::time::Duration;

use spielplatz_diagnostics::ProtocolError;
use spielplatz_engine::EngineError;
use thiserror::Error;

use crate::state::InvalidTransition;

/// Errors reported by a host-side execution context handle.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A run was dispatched before `ready` was observed.
    #[error("Execution context is not ready yet")]
    NotInitialized,

    /// A run was dispatched while another one is in flight.
    #[error("Execution context is already running a program")]
    Busy,

    /// Events were requested while no run is in flight.
    #[error("No run is in flight on this execution context")]
    Idle,

    /// The host terminated the context.
    #[error("Execution context was terminated")]
    Terminated,

    /// The context went away on its own.
    #[error("Execution context closed: {reason}")]
    Closed {
        /// Why the context closed, as far as the host can tell.
        reason: String,
    },

    /// The host-side timeout elapsed and the context was terminated.
    #[error("Run timed out after {} ms", .0.as_millis())]
    TimedOut(Duration),

    /// The context could not be started.
    #[error("Failed to start execution context: {0}")]
    Spawn(String),

    /// The context sent a malformed frame.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The context sent a message that is not valid in its current state.
    #[error("Protocol violation: {0}")]
    Transition(#[from] InvalidTransition),
}

impl ContextError {
    /// Creates a closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Creates a spawn error.
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn(message.into())
    }
}

/// Errors reported by the backend facade.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The in-host engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The execution context failed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The engine inside the execution context failed during a run.
    #[error("Engine failed during run: {0}")]
    EngineFailure(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
