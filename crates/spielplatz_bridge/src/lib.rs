//! # spielplatz_bridge
//!
//! Connects a host surface to the Spielplatz engine.
//!
//! This crate provides:
//! - The wire protocol between host and execution context
//! - Execution contexts isolated in a thread or a child process
//! - A pool of contexts for concurrent runs
//! - The [`Backend`] facade with `lint`, `run` and `compile`
//! - Configuration loading (`.spielplatz.jsonc`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spielplatz_bridge::{Backend, BridgeConfig};
//! use spielplatz_engine::WasmEngineLoader;
//!
//! let config = BridgeConfig::default();
//! let loader = Arc::new(WasmEngineLoader::from_file("engine.wasm"));
//! let mut backend = Backend::new(loader, &config);
//!
//! let diagnostics = backend.lint("let x = ")?;
//! let result = backend.run("print 1", "vm", |chunk| print!("{chunk}")).await?;
//! ```

mod backend;
mod config;
mod context;
mod error;
mod handle;
mod pool;
mod protocol;
mod state;
mod worker;

pub use backend::Backend;
pub use config::{BridgeConfig, Isolation};
pub use context::{
    ContextFactory, ProcessCommand, ProcessContextFactory, ThreadContextFactory,
    spawn_process_context, spawn_thread_context,
};
pub use error::{BridgeError, ContextError};
pub use handle::{ContextHandle, HostInbox, Transport};
pub use pool::{ContextPool, PooledContext};
pub use protocol::{
    Completion, ContextMessage, EngineFailure, RequestId, RunRequest, decode_message,
    decode_request, encode_message, encode_request,
};
pub use state::{ContextState, InvalidTransition, Transition};
pub use worker::{ContextWorker, HostGone, HostSender, LineOutbox, Outbox, serve_stdio};

pub use spielplatz_diagnostics as diagnostics;
pub use spielplatz_engine as engine;
