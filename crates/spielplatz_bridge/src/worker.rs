//! The execution-context side of the bridge.
//!
//! A [`ContextWorker`] owns one [`EngineAdapter`], loads it, announces
//! `ready` and then serves run requests one at a time. The same loop
//! backs both isolation flavours: thread contexts feed it from a channel,
//! process contexts feed it JSON lines from stdin.

use std::io::{BufRead, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use spielplatz_diagnostics::ProtocolError;
use spielplatz_engine::{EngineAdapter, EngineError, EngineLoader, InterruptHandle};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::{Completion, ContextMessage, RunRequest, decode_request, encode_message};
use crate::state::{ContextState, Transition};

/// The host stopped listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostGone;

/// Where a worker posts messages for the host.
pub trait Outbox: Clone + Send + 'static {
    /// Delivers one message, in order.
    fn post(&self, message: ContextMessage) -> Result<(), HostGone>;
}

/// Channel from a thread context to its host handle.
pub type HostSender = mpsc::UnboundedSender<Result<ContextMessage, ProtocolError>>;

impl Outbox for HostSender {
    fn post(&self, message: ContextMessage) -> Result<(), HostGone> {
        self.send(Ok(message)).map_err(|_| HostGone)
    }
}

/// Writes one JSON frame per line.
pub struct LineOutbox<W> {
    writer: Arc<Mutex<W>>,
}

impl<W> Clone for LineOutbox<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W: Write + Send + 'static> LineOutbox<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

impl<W: Write + Send + 'static> Outbox for LineOutbox<W> {
    fn post(&self, message: ContextMessage) -> Result<(), HostGone> {
        let frame = encode_message(&message).map_err(|e| {
            error!("Failed to encode `{}` message: {}", message.tag(), e);
            HostGone
        })?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{frame}")
            .and_then(|()| writer.flush())
            .map_err(|_| HostGone)
    }
}

/// Serves run requests with one engine instance.
pub struct ContextWorker {
    adapter: EngineAdapter,
    state: ContextState,
}

impl ContextWorker {
    /// Creates a worker around an unloaded adapter.
    pub fn new(adapter: EngineAdapter) -> Self {
        Self {
            adapter,
            state: ContextState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Handle that aborts the engine's current call, once loaded.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.adapter.interrupt_handle()
    }

    /// Loads the engine.
    ///
    /// On failure the worker is terminated and will never announce
    /// `ready`.
    pub fn load(&mut self) -> Result<(), EngineError> {
        if self.state != ContextState::Uninitialized {
            return Ok(());
        }
        self.transition(Transition::Start);

        match self.adapter.initialize() {
            Ok(()) => {
                self.transition(Transition::Loaded);
                Ok(())
            }
            Err(e) => {
                error!("Engine failed to load: {}", e);
                self.transition(Transition::Failed);
                Err(e)
            }
        }
    }

    /// Announces `ready` and handles requests until the source runs dry
    /// or the host goes away.
    ///
    /// Loads the engine first if [`load`](Self::load) was not called.
    pub fn serve<I, O>(mut self, requests: I, outbox: &O)
    where
        I: IntoIterator<Item = Result<RunRequest, ProtocolError>>,
        O: Outbox,
    {
        if self.load().is_err() || !self.state.is_ready() {
            return;
        }
        if outbox.post(ContextMessage::Ready).is_err() {
            debug!("Host went away before ready");
            return;
        }
        info!(engine = self.adapter.engine_name(), "Execution context ready");

        for request in requests {
            if self.handle(request, outbox).is_err() {
                debug!("Host went away, stopping");
                break;
            }
        }
        self.transition(Transition::Terminate);
    }

    /// Handles one request: zero or more `print` messages followed by
    /// exactly one `finished`.
    pub fn handle<O: Outbox>(
        &mut self,
        request: Result<RunRequest, ProtocolError>,
        outbox: &O,
    ) -> Result<(), HostGone> {
        self.transition(Transition::RunRequested);

        let completion = match request {
            Ok(request) => self.execute(request, outbox),
            Err(e) => {
                warn!("Rejecting malformed request: {}", e);
                Completion::failed(format!("malformed request: {e}"))
            }
        };

        self.transition(Transition::Completed);
        outbox.post(ContextMessage::Finished(completion))
    }

    fn execute<O: Outbox>(&mut self, request: RunRequest, outbox: &O) -> Completion {
        debug!(
            id = ?request.id,
            backend = %request.backend,
            "Running {} bytes of source",
            request.code.len()
        );

        let prints = outbox.clone();
        let sink = move |chunk: &str| {
            if prints.post(ContextMessage::Print(chunk.to_string())).is_err() {
                debug!("Dropping output chunk, host went away");
            }
        };

        match self.adapter.run(&request.code, &request.backend, sink) {
            Ok(result) => Completion::Completed(result),
            Err(e) => {
                warn!(id = ?request.id, "Run failed: {}", e);
                Completion::failed(e.to_string())
            }
        }
    }

    fn transition(&mut self, transition: Transition) {
        match self.state.apply(transition) {
            Ok(next) => self.state = next,
            Err(e) => error!("{}", e),
        }
    }
}

/// Hosts one execution context over line-delimited JSON.
///
/// Reads request frames from `input` and writes message frames to
/// `output` until `input` is exhausted. Fails only if the engine cannot
/// be loaded.
pub fn serve_stdio<R, W>(loader: Arc<dyn EngineLoader>, input: R, output: W) -> Result<(), EngineError>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let mut worker = ContextWorker::new(EngineAdapter::new(loader));
    worker.load()?;

    let requests = input
        .lines()
        .map_while(|line| match line {
            Ok(line) => Some(line),
            Err(e) => {
                warn!("Failed to read request: {}", e);
                None
            }
        })
        .filter(|line| !line.trim().is_empty())
        .map(|line| decode_request(&line));

    worker.serve(requests, &LineOutbox::new(output));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_message;
    use pretty_assertions::assert_eq;
    use spielplatz_engine::test_utils::{FailingLoader, ScriptEngineLoader};
    use std::io::Cursor;

    /// Collects frames written by a worker.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn messages(&self) -> Vec<ContextMessage> {
            let bytes = self.0.lock().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| decode_message(line).unwrap())
                .collect()
        }
    }

    fn serve(input: &str) -> Vec<ContextMessage> {
        let output = SharedBuffer::default();
        serve_stdio(
            Arc::new(ScriptEngineLoader::new()),
            Cursor::new(input.to_string()),
            output.clone(),
        )
        .unwrap();
        output.messages()
    }

    #[test]
    fn test_ready_is_announced_first() {
        assert_eq!(serve(""), vec![ContextMessage::Ready]);
    }

    #[test]
    fn test_prints_precede_finished() {
        let messages = serve("[1, \"print 1; print 2;\", \"vm\"]\n");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ContextMessage::Ready);
        assert_eq!(messages[1], ContextMessage::Print("1".to_string()));
        assert_eq!(messages[2], ContextMessage::Print("2".to_string()));
        assert!(matches!(
            &messages[3],
            ContextMessage::Finished(Completion::Completed(result)) if result.exit_code() == Some(0)
        ));
    }

    #[test]
    fn test_malformed_request_gets_one_finished() {
        let messages = serve("{\"code\": \"print 1\"}\n[2, \"exit 3\", \"vm\"]\n");

        assert_eq!(messages.len(), 3);
        assert!(matches!(
            &messages[1],
            ContextMessage::Finished(Completion::Failed(failure))
                if failure.engine_error.starts_with("malformed request")
        ));
        assert!(matches!(
            &messages[2],
            ContextMessage::Finished(Completion::Completed(result)) if result.exit_code() == Some(3)
        ));
    }

    #[test]
    fn test_adapter_failure_keeps_context_usable() {
        let messages = serve("[1, \"garbage\", \"vm\"]\n[2, \"panic\", \"vm\"]\n[3, \"print ok\", \"vm\"]\n");

        assert!(matches!(
            &messages[1],
            ContextMessage::Finished(Completion::Failed(failure))
                if failure.engine_error.contains("malformed `run` reply")
        ));
        assert!(matches!(
            &messages[2],
            ContextMessage::Finished(Completion::Failed(failure))
                if failure.engine_error.contains("unreachable")
        ));
        assert_eq!(messages[3], ContextMessage::Print("ok".to_string()));
        assert!(matches!(
            &messages[4],
            ContextMessage::Finished(Completion::Completed(_))
        ));
    }

    #[test]
    fn test_runtime_error_is_completed_result() {
        let messages = serve("[null, \"recurse\", \"vm\"]\n");

        let ContextMessage::Finished(Completion::Completed(result)) = &messages[1] else {
            panic!("expected a completed run, got {:?}", messages[1]);
        };
        assert!(result.runtime_error.is_some());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let messages = serve("\n   \n[1, \"exit 0\", \"vm\"]\n\n");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_load_failure_announces_nothing() {
        let output = SharedBuffer::default();

        let result = serve_stdio(
            Arc::new(FailingLoader::new("missing module")),
            Cursor::new("[1, \"print 1\", \"vm\"]\n".to_string()),
            output.clone(),
        );

        assert!(matches!(result, Err(EngineError::Load(_))));
        assert!(output.messages().is_empty());
    }

    #[test]
    fn test_worker_states() {
        let mut worker = ContextWorker::new(EngineAdapter::new(Arc::new(ScriptEngineLoader::new())));
        assert_eq!(worker.state(), ContextState::Uninitialized);

        worker.load().unwrap();
        assert_eq!(worker.state(), ContextState::Ready);
        assert!(worker.interrupt_handle().is_some());

        let (tx, mut rx) = mpsc::unbounded_channel();
        worker
            .handle(Ok(RunRequest::new(None, "print x", "vm")), &tx)
            .unwrap();

        assert_eq!(worker.state(), ContextState::Ready);
        assert_eq!(rx.try_recv().unwrap().unwrap(), ContextMessage::Print("x".to_string()));
        assert!(matches!(
            rx.try_recv().unwrap().unwrap(),
            ContextMessage::Finished(Completion::Completed(_))
        ));
    }

    #[test]
    fn test_failed_load_terminates_worker() {
        let mut worker = ContextWorker::new(EngineAdapter::new(Arc::new(FailingLoader::new("nope"))));

        assert!(worker.load().is_err());
        assert_eq!(worker.state(), ContextState::Terminated);
    }
}
