//! Thread-isolated execution contexts.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use spielplatz_engine::{EngineAdapter, EngineLoader, InterruptHandle};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ContextFactory, next_context_id};
use crate::error::ContextError;
use crate::handle::{ContextHandle, Transport};
use crate::protocol::RunRequest;
use crate::worker::ContextWorker;

/// State shared between the host handle and the context thread.
#[derive(Default)]
struct Shared {
    interrupt: Mutex<Option<InterruptHandle>>,
    load_error: Mutex<Option<String>>,
}

struct ThreadTransport {
    requests: Option<Sender<RunRequest>>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Transport for ThreadTransport {
    fn send(&mut self, request: &RunRequest) -> Result<(), ContextError> {
        let requests = self.requests.as_ref().ok_or(ContextError::Terminated)?;
        if requests.send(request.clone()).is_ok() {
            return Ok(());
        }
        let reason = self
            .exit_reason()
            .unwrap_or_else(|| "context thread stopped".to_string());
        Err(ContextError::closed(reason))
    }

    fn terminate(&mut self) {
        self.requests = None;
        if let Some(interrupt) = self.shared.interrupt.lock().take() {
            debug!("Interrupting engine");
            interrupt.interrupt();
        }
        // The thread winds down on its own once the engine call returns.
        self.thread = None;
    }

    fn exit_reason(&mut self) -> Option<String> {
        if let Some(reason) = self.shared.load_error.lock().clone() {
            return Some(reason);
        }

        let finished = self.thread.as_ref().is_some_and(|t| t.is_finished());
        if finished && let Some(thread) = self.thread.take() {
            return match thread.join() {
                Ok(()) => None,
                Err(_) => Some("context thread panicked".to_string()),
            };
        }
        None
    }
}

/// Starts an execution context on a dedicated thread.
///
/// The thread loads its own engine from `loader`. Requests travel over a
/// crossbeam channel and messages come back over a tokio channel.
pub fn spawn_thread_context(loader: Arc<dyn EngineLoader>) -> Result<ContextHandle, ContextError> {
    let id = next_context_id();
    let (request_tx, request_rx) = crossbeam_channel::unbounded::<RunRequest>();
    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());

    let worker_shared = Arc::clone(&shared);
    let thread = thread::Builder::new()
        .name(format!("spielplatz-context-{id}"))
        .spawn(move || {
            let mut worker = ContextWorker::new(EngineAdapter::new(loader));
            if let Err(e) = worker.load() {
                *worker_shared.load_error.lock() = Some(e.to_string());
                return;
            }
            *worker_shared.interrupt.lock() = worker.interrupt_handle();
            worker.serve(request_rx.iter().map(Ok), &host_tx);
            debug!(context = id, "Context thread exiting");
        })
        .map_err(|e| ContextError::spawn(e.to_string()))?;

    debug!(context = id, "Spawned thread context");
    let transport = ThreadTransport {
        requests: Some(request_tx),
        shared,
        thread: Some(thread),
    };
    Ok(ContextHandle::new(id, Box::new(transport), host_rx))
}

/// Spawns thread contexts that share one engine loader.
#[derive(Clone)]
pub struct ThreadContextFactory {
    loader: Arc<dyn EngineLoader>,
}

impl ThreadContextFactory {
    /// Creates a factory.
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self { loader }
    }
}

impl ContextFactory for ThreadContextFactory {
    fn spawn(&self) -> Result<ContextHandle, ContextError> {
        spawn_thread_context(Arc::clone(&self.loader)).inspect_err(|e| {
            warn!("Failed to spawn thread context: {}", e);
        })
    }

    fn describe(&self) -> String {
        format!("thread contexts ({})", self.loader.describe())
    }
}
