//! The backend facade offered to host surfaces.

use std::sync::Arc;
use std::time::Duration;

use spielplatz_diagnostics::{CompileResult, Diagnostic, RunResult};
use spielplatz_engine::{EngineAdapter, EngineLoader};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::context::{ContextFactory, ThreadContextFactory};
use crate::error::BridgeError;
use crate::pool::ContextPool;

/// Lint, run and compile entry points for a host surface.
///
/// Static analysis and compilation are bounded and produce no output, so
/// they run in the host's own engine instance. Program execution always
/// goes through an isolated execution context taken from the pool.
pub struct Backend {
    adapter: EngineAdapter,
    pool: ContextPool,
    default_backend: String,
    run_timeout: Option<Duration>,
}

impl Backend {
    /// Creates a facade running programs in thread contexts.
    pub fn new(loader: Arc<dyn EngineLoader>, config: &BridgeConfig) -> Self {
        let factory = Arc::new(ThreadContextFactory::new(Arc::clone(&loader)));
        Self::with_factory(loader, factory, config)
    }

    /// Creates a facade running programs in contexts from `factory`.
    pub fn with_factory(
        loader: Arc<dyn EngineLoader>,
        factory: Arc<dyn ContextFactory>,
        config: &BridgeConfig,
    ) -> Self {
        info!(
            "Backend using {} (pool size {})",
            factory.describe(),
            config.pool_size
        );
        Self {
            adapter: EngineAdapter::new(loader),
            pool: ContextPool::new(factory, config.pool_size),
            default_backend: config.backend.clone(),
            run_timeout: config.run_timeout(),
        }
    }

    /// Backend used when the caller does not pick one.
    pub fn default_backend(&self) -> &str {
        &self.default_backend
    }

    /// The execution context pool.
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Runs static analysis on `code`.
    pub fn lint(&mut self, code: &str) -> Result<Vec<Diagnostic>, BridgeError> {
        self.adapter.initialize()?;
        Ok(self.adapter.lint(code)?)
    }

    /// Compiles `code` with a compiling backend.
    pub fn compile(&mut self, code: &str, backend: &str) -> Result<CompileResult, BridgeError> {
        self.adapter.initialize()?;
        Ok(self.adapter.compile(code, backend)?)
    }

    /// Runs `code` in an execution context, streaming output chunks to
    /// `on_print` in production order.
    ///
    /// A program that crashes still yields `Ok` with the crash recorded in
    /// [`RunResult::runtime_error`]. A failure of the engine itself is
    /// reported as [`BridgeError::EngineFailure`].
    pub async fn run(
        &self,
        code: &str,
        backend: &str,
        on_print: impl FnMut(&str),
    ) -> Result<RunResult, BridgeError> {
        let mut context = self.pool.acquire()?;
        context.wait_ready().await?;
        debug!(context = context.id(), backend, "Running program");

        let completion = match self.run_timeout {
            Some(timeout) => {
                context
                    .run_with_timeout(code, backend, on_print, timeout)
                    .await?
            }
            None => context.run(code, backend, on_print).await?,
        };

        completion.into_result().map_err(BridgeError::EngineFailure)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("adapter", &self.adapter)
            .field("contexts", &self.pool.describe())
            .field("default_backend", &self.default_backend)
            .field("run_timeout", &self.run_timeout)
            .finish()
    }
}
