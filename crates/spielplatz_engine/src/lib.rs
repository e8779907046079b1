//! # spielplatz_engine
//!
//! Engine adapter for the Spielplatz language engine.
//!
//! This crate provides:
//! - The engine boundary (`EngineModule`, `EngineLoader`)
//! - The `EngineAdapter` lifecycle object that loads one engine instance
//!   and turns its JSON replies into typed results
//! - Streaming of program output through `OutputSink`
//!
//! ## Features
//!
//! - `native` (default): Enable the Extism-backed WASM engine loader
//! - `test-utils`: Expose `ScriptEngine`, a deterministic engine for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spielplatz_engine::{EngineAdapter, WasmEngineLoader};
//!
//! let mut adapter = EngineAdapter::new(Arc::new(WasmEngineLoader::from_file("engine.wasm")));
//! adapter.initialize()?;
//!
//! for diagnostic in adapter.lint(source)? {
//!     println!("{}", diagnostic.message);
//! }
//! ```

mod adapter;
mod error;
mod module;

#[cfg(feature = "native")]
mod wasm;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapter::EngineAdapter;
pub use error::EngineError;
pub use module::{DiscardOutput, EngineLoader, EngineModule, InterruptHandle, OutputSink};

#[cfg(feature = "native")]
pub use wasm::{DEFAULT_MEMORY_MAX_PAGES, WasmEngineLoader, WasmEngineOptions};
