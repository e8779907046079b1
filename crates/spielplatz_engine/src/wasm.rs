//! Extism-based WASM engine for native environments.
//!
//! The engine module is a WASM binary exporting:
//!
//! - `analyze(source) -> diagnostics JSON`
//! - `run({"code", "backend"}) -> RunResult JSON`
//! - `compile({"code", "backend"}) -> CompileResult JSON` (optional)
//! - `init()` (optional, called once after instantiation)
//!
//! The host provides a `print(text)` import that forwards each output
//! chunk to the sink of the run currently in progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use extism::{CancelHandle, Manifest, PTR, Plugin, PluginBuilder, UserData, Wasm, host_fn};
use extism_manifest::MemoryOptions;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{EngineError, EngineLoader, EngineModule, InterruptHandle, OutputSink};

/// Default memory limit for engine instances (128 MB = 2048 pages).
/// Each WASM page is 64KB.
pub const DEFAULT_MEMORY_MAX_PAGES: u32 = 2048;

/// Resource limits applied to every engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WasmEngineOptions {
    /// Limit on memory pages.
    pub memory_max_pages: u32,
    /// Engine-side timeout per call. `None` lets calls run until the
    /// context is terminated.
    pub timeout_ms: Option<u64>,
}

impl Default for WasmEngineOptions {
    fn default() -> Self {
        Self {
            memory_max_pages: DEFAULT_MEMORY_MAX_PAGES,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone)]
enum WasmSource {
    File(PathBuf),
    Bytes(Arc<[u8]>),
}

/// Loads engine instances from a WASM module.
#[derive(Debug, Clone)]
pub struct WasmEngineLoader {
    source: WasmSource,
    options: WasmEngineOptions,
}

impl WasmEngineLoader {
    /// Loads engines from a file on disk.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: WasmSource::File(path.into()),
            options: WasmEngineOptions::default(),
        }
    }

    /// Loads engines from an in-memory module.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source: WasmSource::Bytes(bytes.into()),
            options: WasmEngineOptions::default(),
        }
    }

    /// Replaces the resource limits.
    pub fn with_options(mut self, options: WasmEngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Path of the module, if it is loaded from disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            WasmSource::File(path) => Some(path),
            WasmSource::Bytes(_) => None,
        }
    }

    /// Builds the manifest with security limits.
    fn manifest(&self) -> Manifest {
        let wasm = match &self.source {
            WasmSource::File(path) => Wasm::file(path),
            WasmSource::Bytes(bytes) => Wasm::data(bytes.to_vec()),
        };

        let mut manifest = Manifest::new([wasm]);
        manifest.timeout_ms = self.options.timeout_ms;
        manifest.memory = MemoryOptions {
            max_pages: Some(self.options.memory_max_pages),
            max_http_response_bytes: None,
            max_var_bytes: None,
        };
        manifest
    }
}

impl EngineLoader for WasmEngineLoader {
    fn load(&self) -> Result<Box<dyn EngineModule>, EngineError> {
        if let Some(path) = self.path()
            && !path.is_file()
        {
            return Err(EngineError::load(format!(
                "engine module not found: {}",
                path.display()
            )));
        }

        let sink: UserData<SinkSlot> = UserData::new(None);
        let mut plugin = PluginBuilder::new(self.manifest())
            .with_wasi(true)
            .with_function("print", [PTR], [], sink.clone(), engine_print)
            .build()
            .map_err(|e| EngineError::load(format!("Failed to create engine: {}", e)))?;

        if plugin.function_exists("init") {
            debug!("Calling engine init");
            plugin
                .call::<&str, &str>("init", "")
                .map_err(|e| EngineError::load(format!("Engine init failed: {}", e)))?;
        }

        for required in ["analyze", "run"] {
            if !plugin.function_exists(required) {
                return Err(EngineError::load(format!(
                    "engine module does not export `{required}`"
                )));
            }
        }

        info!("Loaded WASM engine from {}", self.describe());
        Ok(Box::new(WasmEngine {
            cancel: plugin.cancel_handle(),
            plugin,
            sink,
            interrupted: Arc::new(AtomicBool::new(false)),
        }))
    }

    fn describe(&self) -> String {
        match &self.source {
            WasmSource::File(path) => path.display().to_string(),
            WasmSource::Bytes(bytes) => format!("<memory: {} bytes>", bytes.len()),
        }
    }
}

/// Output sink of the run in progress, if any.
type SinkSlot = Option<Box<dyn OutputSink>>;

host_fn!(engine_print(slot: SinkSlot; chunk: String) {
    let slot = slot.get()?;
    let mut slot = slot
        .lock()
        .map_err(|_| extism::Error::msg("output sink lock poisoned"))?;
    if let Some(sink) = slot.as_mut() {
        sink.emit(&chunk);
    }
    Ok(())
});

#[derive(Serialize)]
struct ExecuteInput<'a> {
    code: &'a str,
    backend: &'a str,
}

/// A loaded WASM engine.
struct WasmEngine {
    plugin: Plugin,
    sink: UserData<SinkSlot>,
    cancel: CancelHandle,
    interrupted: Arc<AtomicBool>,
}

impl WasmEngine {
    fn install_sink(&self, sink: SinkSlot) -> Result<(), EngineError> {
        let slot = self
            .sink
            .get()
            .map_err(|e| EngineError::call("run", e.to_string()))?;
        let mut slot = slot
            .lock()
            .map_err(|_| EngineError::call("run", "output sink lock poisoned"))?;
        *slot = sink;
        Ok(())
    }

    fn call(&mut self, entry: &'static str, input: &str) -> Result<String, EngineError> {
        self.interrupted.store(false, Ordering::SeqCst);
        self.plugin.call::<&str, String>(entry, input).map_err(|e| {
            if self.interrupted.load(Ordering::SeqCst) {
                EngineError::Interrupted
            } else {
                EngineError::call(entry, e.to_string())
            }
        })
    }
}

impl EngineModule for WasmEngine {
    fn name(&self) -> &str {
        "wasm"
    }

    fn analyze(&mut self, code: &str) -> Result<String, EngineError> {
        self.call("analyze", code)
    }

    fn run(
        &mut self,
        code: &str,
        backend: &str,
        sink: Box<dyn OutputSink>,
    ) -> Result<String, EngineError> {
        let input = serde_json::to_string(&ExecuteInput { code, backend })
            .map_err(|e| EngineError::call("run", e.to_string()))?;

        self.install_sink(Some(sink))?;
        let reply = self.call("run", &input);
        if let Err(e) = self.install_sink(None) {
            warn!("Failed to detach output sink: {}", e);
        }
        reply
    }

    fn compile(&mut self, code: &str, backend: &str) -> Result<String, EngineError> {
        if !self.plugin.function_exists("compile") {
            return Err(EngineError::Unsupported("compile"));
        }
        let input = serde_json::to_string(&ExecuteInput { code, backend })
            .map_err(|e| EngineError::call("compile", e.to_string()))?;
        self.call("compile", &input)
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        let cancel = self.cancel.clone();
        let interrupted = Arc::clone(&self.interrupted);
        Some(InterruptHandle::new(move || {
            interrupted.store(true, Ordering::SeqCst);
            if let Err(e) = cancel.cancel() {
                warn!("Failed to cancel engine call: {}", e);
            }
        }))
    }
}
