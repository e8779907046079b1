//! Process-isolated execution contexts.
//!
//! The child reads request frames from stdin and writes message frames to
//! stdout, one JSON document per line. Its stderr is inherited so engine
//! logs stay visible.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ContextFactory, next_context_id};
use crate::error::ContextError;
use crate::handle::{ContextHandle, Transport};
use crate::protocol::{RunRequest, decode_message, encode_request};
use crate::worker::HostSender;

const EXIT_POLL_ATTEMPTS: usize = 10;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Command line that starts a context process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessCommand {
    /// Creates a command for `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program to run.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// State shared between the transport and the stdout reader thread.
struct Shared {
    child: Mutex<Child>,
    exit_reason: Mutex<Option<String>>,
}

struct ProcessTransport {
    shared: Arc<Shared>,
    stdin: Option<ChildStdin>,
}

impl Transport for ProcessTransport {
    fn send(&mut self, request: &RunRequest) -> Result<(), ContextError> {
        let frame = encode_request(request)?;
        let stdin = self.stdin.as_mut().ok_or(ContextError::Terminated)?;

        let written = writeln!(stdin, "{frame}").and_then(|()| stdin.flush());
        match written {
            Ok(()) => Ok(()),
            Err(e) => {
                let reason = self.exit_reason().unwrap_or_else(|| e.to_string());
                Err(ContextError::closed(reason))
            }
        }
    }

    fn terminate(&mut self) {
        self.stdin = None;
        let mut child = self.shared.child.lock();
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = child.kill() {
                    debug!("Failed to kill context process: {}", e);
                }
                if let Err(e) = child.wait() {
                    debug!("Failed to reap context process: {}", e);
                }
            }
        }
    }

    fn exit_reason(&mut self) -> Option<String> {
        if let Some(reason) = self.shared.exit_reason.lock().clone() {
            return Some(reason);
        }
        match self.shared.child.lock().try_wait() {
            Ok(Some(status)) => Some(describe_exit(status)),
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    format!("context process exited with {status}")
}

/// Starts an execution context in a child process.
pub fn spawn_process_context(command: &ProcessCommand) -> Result<ContextHandle, ContextError> {
    let id = next_context_id();
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| ContextError::spawn(format!("{}: {}", command.program.display(), e)))?;

    let stdin = child.stdin.take();
    let Some(stdout) = child.stdout.take() else {
        kill(&mut child);
        return Err(ContextError::spawn("context stdout was not captured"));
    };
    let pid = child.id();

    let shared = Arc::new(Shared {
        child: Mutex::new(child),
        exit_reason: Mutex::new(None),
    });
    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let reader = {
        let shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("spielplatz-context-{id}-reader"))
            .spawn(move || {
                read_frames(stdout, &host_tx);
                // Recorded before the sender drops.
                *shared.exit_reason.lock() = await_exit(&shared.child);
            })
    };
    if let Err(e) = reader {
        kill(&mut shared.child.lock());
        return Err(ContextError::spawn(e.to_string()));
    }

    debug!(context = id, pid, "Spawned process context");
    let transport = ProcessTransport { shared, stdin };
    Ok(ContextHandle::new(id, Box::new(transport), host_rx))
}

fn kill(child: &mut Child) {
    if child.kill().is_ok() {
        let _ = child.wait();
    }
}

/// Forwards decoded stdout frames until the child closes stdout or the
/// host hangs up.
fn read_frames(stdout: impl Read, host: &HostSender) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read from context process: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if host.send(decode_message(&line)).is_err() {
            break;
        }
    }
}

/// Polls for the exit status after stdout closed.
///
/// Blocks, so it only runs on the reader thread. Gives up if the child
/// keeps running with stdout closed.
fn await_exit(child: &Mutex<Child>) -> Option<String> {
    for _ in 0..EXIT_POLL_ATTEMPTS {
        let status = child.lock().try_wait();
        match status {
            Ok(Some(status)) => return Some(describe_exit(status)),
            Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
            Err(e) => return Some(e.to_string()),
        }
    }
    None
}

/// Spawns process contexts from one command line.
#[derive(Debug, Clone)]
pub struct ProcessContextFactory {
    command: ProcessCommand,
}

impl ProcessContextFactory {
    /// Creates a factory.
    pub fn new(command: ProcessCommand) -> Self {
        Self { command }
    }
}

impl ContextFactory for ProcessContextFactory {
    fn spawn(&self) -> Result<ContextHandle, ContextError> {
        spawn_process_context(&self.command).inspect_err(|e| {
            warn!("Failed to spawn process context: {}", e);
        })
    }

    fn describe(&self) -> String {
        format!("process contexts ({})", self.command.program.display())
    }
}
