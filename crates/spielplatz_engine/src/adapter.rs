//! Engine lifecycle and reply parsing.

use std::sync::Arc;

use spielplatz_diagnostics::{CompileResult, Diagnostic, RunResult, parse_diagnostics};
use tracing::{debug, info};

use crate::{EngineError, EngineLoader, EngineModule, InterruptHandle, OutputSink};

/// Owns exactly one engine instance and enforces initialization order.
///
/// The adapter starts empty. [`initialize`](Self::initialize) loads the
/// engine on first call and is a no-op afterwards; every entry point
/// fails with [`EngineError::NotInitialized`] until then.
///
/// # Example
///
/// ```rust,ignore
/// let mut adapter = EngineAdapter::new(loader);
/// adapter.initialize()?;
///
/// let diagnostics = adapter.lint("let x = ")?;
/// let result = adapter.run("print 1", "vm", |chunk: &str| print!("{chunk}"))?;
/// ```
pub struct EngineAdapter {
    loader: Arc<dyn EngineLoader>,
    module: Option<Box<dyn EngineModule>>,
}

impl EngineAdapter {
    /// Creates an adapter that will load its engine from `loader`.
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            module: None,
        }
    }

    /// Loads the engine if it is not loaded yet.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if self.module.is_some() {
            return Ok(());
        }

        info!("Loading engine from {}", self.loader.describe());
        let module = self.loader.load()?;
        debug!(engine = module.name(), "Engine ready");
        self.module = Some(module);
        Ok(())
    }

    /// Returns true once the engine has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.module.is_some()
    }

    /// Name of the loaded engine.
    pub fn engine_name(&self) -> Option<&str> {
        self.module.as_deref().map(|module| module.name())
    }

    fn module_mut(&mut self) -> Result<&mut (dyn EngineModule + 'static), EngineError> {
        self.module
            .as_deref_mut()
            .ok_or(EngineError::NotInitialized)
    }

    /// Runs static analysis and returns the findings in engine order.
    pub fn lint(&mut self, code: &str) -> Result<Vec<Diagnostic>, EngineError> {
        let reply = self.module_mut()?.analyze(code)?;
        let diagnostics =
            parse_diagnostics(&reply).map_err(|e| EngineError::malformed("analyze", e))?;

        debug!("Analysis produced {} diagnostic(s)", diagnostics.len());
        Ok(diagnostics)
    }

    /// Executes a program with the given backend.
    ///
    /// Program output is handed to `sink` as it is produced. A program
    /// that crashes still yields `Ok`, with the crash recorded in
    /// [`RunResult::runtime_error`].
    pub fn run(
        &mut self,
        code: &str,
        backend: &str,
        sink: impl OutputSink + 'static,
    ) -> Result<RunResult, EngineError> {
        let reply = self.module_mut()?.run(code, backend, Box::new(sink))?;
        let result = RunResult::from_json(&reply).map_err(|e| EngineError::malformed("run", e))?;

        debug!(
            backend,
            code = ?result.code,
            aborted = result.runtime_error.is_some(),
            "Run finished"
        );
        Ok(result)
    }

    /// Compiles a program with a compiling backend.
    pub fn compile(&mut self, code: &str, backend: &str) -> Result<CompileResult, EngineError> {
        let reply = self.module_mut()?.compile(code, backend)?;
        CompileResult::from_json(&reply).map_err(|e| EngineError::malformed("compile", e))
    }

    /// Handle that aborts the current engine call, if supported.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.module.as_deref().and_then(|module| module.interrupt_handle())
    }
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("loader", &self.loader.describe())
            .field("engine", &self.engine_name())
            .finish()
    }
}
