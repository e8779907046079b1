//! Execution context pooling for concurrent runs.
//!
//! A context serves one run at a time, so concurrent runs each take their
//! own context from the pool. Contexts are spawned lazily and returned on
//! drop when they are still usable.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::context::ContextFactory;
use crate::error::ContextError;
use crate::handle::ContextHandle;

/// Thread-safe pool of execution contexts.
///
/// # Example
///
/// ```ignore
/// let pool = ContextPool::new(Arc::new(ThreadContextFactory::new(loader)), 2);
///
/// let mut context = pool.acquire()?;
/// context.wait_ready().await?;
/// let completion = context.run("print 1", "vm", |chunk| print!("{chunk}")).await?;
/// // context is returned to the pool when dropped
/// ```
pub struct ContextPool {
    factory: Arc<dyn ContextFactory>,
    available: Mutex<VecDeque<ContextHandle>>,
    max_idle: usize,
}

impl ContextPool {
    /// Creates an empty pool keeping at most `max_idle` idle contexts.
    pub fn new(factory: Arc<dyn ContextFactory>, max_idle: usize) -> Self {
        Self {
            factory,
            available: Mutex::new(VecDeque::new()),
            max_idle,
        }
    }

    /// Takes an idle context, or spawns a new one.
    ///
    /// A freshly spawned context may still be initializing; call
    /// [`ContextHandle::wait_ready`] before dispatching.
    pub fn acquire(&self) -> Result<PooledContext<'_>, ContextError> {
        let existing = self.available.lock().pop_front();
        let context = match existing {
            Some(context) => {
                debug!(context = context.id(), "Reusing pooled context");
                context
            }
            None => self.factory.spawn()?,
        };
        Ok(PooledContext {
            context: Some(context),
            pool: self,
        })
    }

    /// Returns the number of idle contexts.
    pub fn available_count(&self) -> usize {
        self.available.lock().len()
    }

    /// Terminates all idle contexts.
    pub fn clear(&self) {
        self.available.lock().clear();
    }

    /// Describes the contexts this pool spawns.
    pub fn describe(&self) -> String {
        self.factory.describe()
    }

    fn release(&self, context: ContextHandle) {
        if !context.is_ready() {
            debug!(context = context.id(), state = ?context.state(), "Discarding context");
            return;
        }
        let mut available = self.available.lock();
        if available.len() < self.max_idle {
            available.push_back(context);
        }
    }
}

/// A RAII guard that returns the context to the pool on drop.
pub struct PooledContext<'a> {
    context: Option<ContextHandle>,
    pool: &'a ContextPool,
}

impl std::ops::Deref for PooledContext<'_> {
    type Target = ContextHandle;

    fn deref(&self) -> &Self::Target {
        self.context.as_ref().expect("context was already taken")
    }
}

impl std::ops::DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context.as_mut().expect("context was already taken")
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.pool.release(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ThreadContextFactory;
    use spielplatz_engine::test_utils::ScriptEngineLoader;
    use std::time::Duration;

    fn pool(max_idle: usize) -> (ContextPool, Arc<ScriptEngineLoader>) {
        let loader = Arc::new(ScriptEngineLoader::new());
        let factory = Arc::new(ThreadContextFactory::new(loader.clone()));
        (ContextPool::new(factory, max_idle), loader)
    }

    #[test]
    fn test_pool_new_is_empty() {
        let (pool, _) = pool(1);
        assert_eq!(pool.available_count(), 0);
    }

    #[tokio::test]
    async fn test_ready_context_is_reused() {
        let (pool, loader) = pool(1);

        {
            let mut context = pool.acquire().unwrap();
            context.wait_ready().await.unwrap();
            context.run("exit 0", "vm", |_| {}).await.unwrap();
        }
        assert_eq!(pool.available_count(), 1);

        let mut context = pool.acquire().unwrap();
        context.wait_ready().await.unwrap();
        assert_eq!(pool.available_count(), 0);
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_unready_context_is_discarded() {
        let (pool, _) = pool(1);

        {
            let _context = pool.acquire().unwrap();
        }

        assert_eq!(pool.available_count(), 0);
    }

    #[tokio::test]
    async fn test_terminated_context_is_discarded() {
        let (pool, loader) = pool(1);

        {
            let mut context = pool.acquire().unwrap();
            context.wait_ready().await.unwrap();
            let _ = context
                .run_with_timeout("loop", "vm", |_| {}, Duration::from_millis(20))
                .await;
        }
        assert_eq!(pool.available_count(), 0);

        let mut context = pool.acquire().unwrap();
        context.wait_ready().await.unwrap();
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_get_distinct_contexts() {
        let (pool, _) = pool(1);

        let mut first = pool.acquire().unwrap();
        let mut second = pool.acquire().unwrap();
        first.wait_ready().await.unwrap();
        second.wait_ready().await.unwrap();
        assert_ne!(first.id(), second.id());

        drop(first);
        drop(second);
        assert_eq!(pool.available_count(), 1, "idle contexts are capped");
    }

    #[tokio::test]
    async fn test_clear_pool() {
        let (pool, _) = pool(2);

        {
            let mut a = pool.acquire().unwrap();
            let mut b = pool.acquire().unwrap();
            a.wait_ready().await.unwrap();
            b.wait_ready().await.unwrap();
        }

        assert_eq!(pool.available_count(), 2);
        pool.clear();
        assert_eq!(pool.available_count(), 0);
    }
}
