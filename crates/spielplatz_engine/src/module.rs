//! Engine module abstraction.
//!
//! The engine is an external collaborator reached through a handful of
//! string-in, JSON-out entry points. This module provides the
//! `EngineModule` trait that abstracts the concrete runtime, allowing the
//! WASM engine in production and a scripted engine in tests.

use std::fmt;
use std::sync::Arc;

use crate::EngineError;

/// Receives program output while a run is in progress.
///
/// Chunks are delivered immediately and in the order the program
/// produced them. Closures of type `FnMut(&str) + Send` implement this
/// trait.
pub trait OutputSink: Send {
    /// Delivers one output chunk.
    fn emit(&mut self, chunk: &str);
}

impl<F> OutputSink for F
where
    F: FnMut(&str) + Send,
{
    fn emit(&mut self, chunk: &str) {
        self(chunk)
    }
}

/// A sink that drops every chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOutput;

impl OutputSink for DiscardOutput {
    fn emit(&mut self, _chunk: &str) {}
}

/// Aborts an engine call from another thread.
///
/// Cloning yields a handle to the same engine instance.
#[derive(Clone)]
pub struct InterruptHandle(Arc<dyn Fn() + Send + Sync>);

impl InterruptHandle {
    /// Wraps the engine-specific interrupt action.
    pub fn new(interrupt: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(interrupt))
    }

    /// Requests that the current engine call stop as soon as possible.
    pub fn interrupt(&self) {
        (self.0)()
    }
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptHandle").finish_non_exhaustive()
    }
}

/// A loaded engine instance.
///
/// Every entry point takes source text and returns the engine's raw
/// JSON reply. Parsing the reply is the adapter's job.
pub trait EngineModule: Send {
    /// Human-readable engine name used in logs.
    fn name(&self) -> &str;

    /// Calls the static-analysis entry point.
    fn analyze(&mut self, code: &str) -> Result<String, EngineError>;

    /// Calls the execution entry point.
    ///
    /// Output produced by the program is pushed into `sink` while the
    /// call is running.
    fn run(
        &mut self,
        code: &str,
        backend: &str,
        sink: Box<dyn OutputSink>,
    ) -> Result<String, EngineError>;

    /// Calls the compile entry point of a compiling backend.
    fn compile(&mut self, _code: &str, _backend: &str) -> Result<String, EngineError> {
        Err(EngineError::Unsupported("compile"))
    }

    /// Returns a handle that aborts the engine's current call, if the
    /// engine can be interrupted.
    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        None
    }
}

/// Produces fresh engine instances.
///
/// Each execution context calls `load` once and owns the result. Loaders
/// are shared between contexts, so they must be cheap to call repeatedly
/// and must not hand out shared engine state.
pub trait EngineLoader: Send + Sync {
    /// Loads and initializes a new engine instance.
    fn load(&self) -> Result<Box<dyn EngineModule>, EngineError>;

    /// Describes where engines come from, for logs and errors.
    fn describe(&self) -> String;
}
