//! Isolated execution contexts.
//!
//! A context runs user programs away from the host so that a runaway or
//! crashing program cannot block or corrupt it. Two flavours exist:
//!
//! - **thread**: a dedicated OS thread owning its own engine instance.
//!   Termination interrupts the engine and abandons the thread.
//! - **process**: a child process speaking the wire protocol over stdio.
//!   Termination kills the child.

mod process;
mod thread;

use std::sync::atomic::{AtomicUsize, Ordering};

pub use process::{ProcessCommand, ProcessContextFactory, spawn_process_context};
pub use thread::{ThreadContextFactory, spawn_thread_context};

use crate::error::ContextError;
use crate::handle::ContextHandle;

/// Starts new execution contexts.
pub trait ContextFactory: Send + Sync {
    /// Starts a context. The returned handle is still initializing.
    fn spawn(&self) -> Result<ContextHandle, ContextError>;

    /// Describes the kind of context, for logs.
    fn describe(&self) -> String;
}

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn next_context_id() -> usize {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}
