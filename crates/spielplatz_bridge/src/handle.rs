//! Host-side view of an execution context.

use std::time::Duration;

use spielplatz_diagnostics::ProtocolError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ContextError;
use crate::protocol::{Completion, ContextMessage, RequestId, RunRequest};
use crate::state::{ContextState, Transition};

/// Messages from a context, as seen by the host.
pub type HostInbox = mpsc::UnboundedReceiver<Result<ContextMessage, ProtocolError>>;

/// Delivers requests to a context and controls its lifetime.
pub trait Transport: Send {
    /// Delivers one run request.
    fn send(&mut self, request: &RunRequest) -> Result<(), ContextError>;

    /// Stops the context abruptly. Must be idempotent.
    fn terminate(&mut self);

    /// Why the context went away on its own, if known.
    fn exit_reason(&mut self) -> Option<String>;
}

/// Host handle for one execution context.
///
/// The handle mirrors the context's lifecycle from the messages it
/// observes. Runs can only be dispatched once `ready` has been observed
/// through [`wait_ready`](Self::wait_ready), and only one run may be in
/// flight at a time.
pub struct ContextHandle {
    id: usize,
    transport: Box<dyn Transport>,
    inbox: HostInbox,
    state: ContextState,
    next_request: u64,
}

impl ContextHandle {
    /// Creates a handle for a freshly started context.
    pub fn new(id: usize, transport: Box<dyn Transport>, inbox: HostInbox) -> Self {
        Self {
            id,
            transport,
            inbox,
            state: ContextState::Initializing,
            next_request: 1,
        }
    }

    /// Identifier used in logs.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Lifecycle state as observed by the host.
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Returns true if a run can be dispatched right now.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Waits until the context announces `ready`.
    ///
    /// Returns immediately if `ready` was already observed.
    pub async fn wait_ready(&mut self) -> Result<(), ContextError> {
        match self.state {
            ContextState::Initializing => {}
            ContextState::Terminated => return Err(ContextError::Terminated),
            _ => return Ok(()),
        }

        match self.receive().await? {
            ContextMessage::Ready => {
                self.state.advance(Transition::Loaded)?;
                debug!(context = self.id, "Context ready");
                Ok(())
            }
            other => Err(self.violation(&other)),
        }
    }

    /// Sends a run request without waiting for its result.
    pub fn dispatch(&mut self, code: &str, backend: &str) -> Result<RequestId, ContextError> {
        match self.state {
            ContextState::Ready => {}
            ContextState::Running => return Err(ContextError::Busy),
            ContextState::Terminated => return Err(ContextError::Terminated),
            ContextState::Uninitialized | ContextState::Initializing => {
                return Err(ContextError::NotInitialized);
            }
        }

        let id = RequestId(self.next_request);
        self.next_request += 1;

        if let Err(e) = self.transport.send(&RunRequest::new(Some(id), code, backend)) {
            warn!(context = self.id, "Failed to dispatch run: {}", e);
            self.terminate();
            return Err(e);
        }
        self.state.advance(Transition::RunRequested)?;
        debug!(context = self.id, request = %id, backend, "Dispatched run");
        Ok(id)
    }

    /// Waits for the next message of the run in flight.
    ///
    /// Yields `print` messages in production order and then exactly one
    /// `finished`, after which the context is ready again.
    pub async fn next_event(&mut self) -> Result<ContextMessage, ContextError> {
        match self.state {
            ContextState::Running => {}
            ContextState::Terminated => return Err(ContextError::Terminated),
            _ => return Err(ContextError::Idle),
        }

        let message = self.receive().await?;
        match &message {
            ContextMessage::Print(_) => self.state.advance(Transition::Output)?,
            ContextMessage::Finished(_) => self.state.advance(Transition::Completed)?,
            ContextMessage::Ready => return Err(self.violation(&message)),
        }
        Ok(message)
    }

    /// Runs a program to completion, passing output chunks to `on_print`.
    pub async fn run(
        &mut self,
        code: &str,
        backend: &str,
        mut on_print: impl FnMut(&str),
    ) -> Result<Completion, ContextError> {
        self.dispatch(code, backend)?;
        loop {
            match self.next_event().await? {
                ContextMessage::Print(chunk) => on_print(&chunk),
                ContextMessage::Finished(completion) => return Ok(completion),
                ready @ ContextMessage::Ready => return Err(self.violation(&ready)),
            }
        }
    }

    /// Like [`run`](Self::run), but terminates the context if no result
    /// arrives within `timeout`.
    pub async fn run_with_timeout(
        &mut self,
        code: &str,
        backend: &str,
        on_print: impl FnMut(&str),
        timeout: Duration,
    ) -> Result<Completion, ContextError> {
        let outcome = tokio::time::timeout(timeout, self.run(code, backend, on_print)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(context = self.id, "Run exceeded {:?}, terminating context", timeout);
                self.terminate();
                Err(ContextError::TimedOut(timeout))
            }
        }
    }

    /// Terminates the context. Anything still in flight is abandoned.
    pub fn terminate(&mut self) {
        if self.state.is_terminated() {
            return;
        }
        info!(context = self.id, state = ?self.state, "Terminating context");
        self.transport.terminate();
        self.inbox.close();
        while self.inbox.try_recv().is_ok() {}
        self.state = ContextState::Terminated;
    }

    async fn receive(&mut self) -> Result<ContextMessage, ContextError> {
        match self.inbox.recv().await {
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => {
                warn!(context = self.id, "Malformed frame from context: {}", e);
                Err(ContextError::Protocol(e))
            }
            None => {
                let reason = self
                    .transport
                    .exit_reason()
                    .unwrap_or_else(|| "context exited".to_string());
                warn!(context = self.id, "Context closed: {}", reason);
                self.transport.terminate();
                self.state = ContextState::Terminated;
                Err(ContextError::closed(reason))
            }
        }
    }

    fn violation(&self, message: &ContextMessage) -> ContextError {
        ContextError::Protocol(ProtocolError::message(format!(
            "unexpected `{}` message while {:?}",
            message.tag(),
            self.state
        )))
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use spielplatz_diagnostics::{Markup, RunResult};
    use std::sync::Arc;

    type Sender = mpsc::UnboundedSender<Result<ContextMessage, ProtocolError>>;

    /// Records requests and lets the test play the context.
    #[derive(Clone, Default)]
    struct FakeTransport {
        sent: Arc<Mutex<Vec<RunRequest>>>,
        terminated: Arc<Mutex<bool>>,
    }

    impl Transport for FakeTransport {
        fn send(&mut self, request: &RunRequest) -> Result<(), ContextError> {
            self.sent.lock().push(request.clone());
            Ok(())
        }

        fn terminate(&mut self) {
            *self.terminated.lock() = true;
        }

        fn exit_reason(&mut self) -> Option<String> {
            Some("engine exploded".to_string())
        }
    }

    fn handle() -> (ContextHandle, Sender, FakeTransport) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = FakeTransport::default();
        (ContextHandle::new(0, Box::new(transport.clone()), rx), tx, transport)
    }

    fn finished(code: i64) -> ContextMessage {
        ContextMessage::Finished(Completion::Completed(RunResult::exited(code, Markup::default())))
    }

    #[tokio::test]
    async fn test_dispatch_before_ready_fails() {
        let (mut handle, tx, transport) = handle();
        tx.send(Ok(ContextMessage::Ready)).unwrap();

        // `ready` is queued but has not been observed yet.
        let err = handle.dispatch("print 1", "vm").unwrap_err();

        assert!(matches!(err, ContextError::NotInitialized));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_streams_prints_then_finished() {
        let (mut handle, tx, transport) = handle();
        tx.send(Ok(ContextMessage::Ready)).unwrap();
        tx.send(Ok(ContextMessage::Print("1".into()))).unwrap();
        tx.send(Ok(ContextMessage::Print("2".into()))).unwrap();
        tx.send(Ok(finished(0))).unwrap();

        handle.wait_ready().await.unwrap();
        let mut chunks = Vec::new();
        let completion = handle
            .run("print 1; print 2;", "vm", |chunk| chunks.push(chunk.to_string()))
            .await
            .unwrap();

        assert_eq!(chunks, vec!["1", "2"]);
        assert_eq!(completion.into_result().unwrap().exit_code(), Some(0));
        assert!(handle.is_ready());
        assert_eq!(
            transport.sent.lock()[0],
            RunRequest::new(Some(RequestId(1)), "print 1; print 2;", "vm")
        );
    }

    #[tokio::test]
    async fn test_second_dispatch_while_running_is_busy() {
        let (mut handle, tx, _) = handle();
        tx.send(Ok(ContextMessage::Ready)).unwrap();
        handle.wait_ready().await.unwrap();

        handle.dispatch("loop", "vm").unwrap();

        assert!(matches!(handle.dispatch("print 1", "vm"), Err(ContextError::Busy)));
        assert_eq!(handle.state(), ContextState::Running);
    }

    #[tokio::test]
    async fn test_next_event_without_run_is_idle() {
        let (mut handle, tx, _) = handle();
        tx.send(Ok(ContextMessage::Ready)).unwrap();
        handle.wait_ready().await.unwrap();

        assert!(matches!(handle.next_event().await, Err(ContextError::Idle)));
    }

    #[tokio::test]
    async fn test_terminate_abandons_in_flight_request() {
        let (mut handle, tx, transport) = handle();
        tx.send(Ok(ContextMessage::Ready)).unwrap();
        handle.wait_ready().await.unwrap();
        handle.dispatch("loop", "vm").unwrap();

        handle.terminate();
        // A late result must never be delivered.
        let _ = tx.send(Ok(finished(0)));

        assert!(*transport.terminated.lock());
        assert!(matches!(handle.next_event().await, Err(ContextError::Terminated)));
        assert!(matches!(handle.dispatch("print 1", "vm"), Err(ContextError::Terminated)));
        assert!(matches!(handle.wait_ready().await, Err(ContextError::Terminated)));
    }

    #[tokio::test]
    async fn test_closed_channel_reports_reason() {
        let (mut handle, tx, _) = handle();
        drop(tx);

        let err = handle.wait_ready().await.unwrap_err();

        assert_eq!(err.to_string(), "Execution context closed: engine exploded");
        assert_eq!(handle.state(), ContextState::Terminated);
    }

    #[tokio::test]
    async fn test_unexpected_message_is_protocol_error() {
        let (mut handle, tx, _) = handle();
        tx.send(Ok(ContextMessage::Print("early".into()))).unwrap();

        let err = handle.wait_ready().await.unwrap_err();

        assert!(matches!(err, ContextError::Protocol(_)));
        assert!(err.to_string().contains("unexpected `print` message"));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_reported() {
        let (mut handle, tx, _) = handle();
        tx.send(Err(ProtocolError::message("bad frame"))).unwrap();

        assert!(matches!(
            handle.wait_ready().await,
            Err(ContextError::Protocol(ProtocolError::Message(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_timeout_terminates() {
        let (mut handle, tx, transport) = handle();
        tx.send(Ok(ContextMessage::Ready)).unwrap();
        handle.wait_ready().await.unwrap();

        let err = handle
            .run_with_timeout("loop", "vm", |_| {}, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, ContextError::TimedOut(_)));
        assert!(*transport.terminated.lock());
        assert_eq!(handle.state(), ContextState::Terminated);
        drop(tx);
    }

    #[tokio::test]
    async fn test_drop_terminates() {
        let (handle, _tx, transport) = handle();
        drop(handle);
        assert!(*transport.terminated.lock());
    }
}
