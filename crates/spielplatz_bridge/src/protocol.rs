//! Wire protocol between the host and an execution context.
//!
//! Every message is a JSON array whose first element is the tag:
//!
//! | Direction      | Frame                          |
//! |----------------|--------------------------------|
//! | context → host | `["ready"]`                    |
//! | host → context | `[requestId \| null, code, backend]` |
//! | context → host | `["print", text]`              |
//! | context → host | `["finished", payload]`        |
//!
//! For one request, zero or more `print` frames precede exactly one
//! `finished` frame. The `finished` payload is either the engine's
//! `RunResult` or an engine-failure wrapper `{"engineError": text}` when
//! the adapter itself failed.

use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use spielplatz_diagnostics::{ProtocolError, RunResult};

/// Host-assigned identifier of a run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request to run a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Optional correlation id.
    pub id: Option<RequestId>,
    /// Source text.
    pub code: String,
    /// Backend selector.
    pub backend: String,
}

impl RunRequest {
    /// Creates a request.
    pub fn new(id: Option<RequestId>, code: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            backend: backend.into(),
        }
    }
}

impl Serialize for RunRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.id, &self.code, &self.backend).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RunRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (id, code, backend) = <(Option<RequestId>, String, String)>::deserialize(deserializer)?;
        Ok(Self { id, code, backend })
    }
}

/// Wrapper reported when the adapter failed during a run.
///
/// Distinct from a `RuntimeError`: the engine, not the user program,
/// is at fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineFailure {
    /// Description of the adapter failure.
    pub engine_error: String,
}

/// Payload of a `finished` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Completion {
    /// The adapter failed; no result was produced.
    Failed(EngineFailure),
    /// The engine returned a result. The program itself may still have
    /// crashed; see [`RunResult::runtime_error`].
    Completed(RunResult),
}

impl Completion {
    /// Wraps an adapter failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(EngineFailure {
            engine_error: message.into(),
        })
    }

    /// Converts into the run result, or the failure text.
    pub fn into_result(self) -> Result<RunResult, String> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Failed(failure) => Err(failure.engine_error),
        }
    }
}

/// A message from an execution context to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextMessage {
    /// The context finished initialization.
    Ready,
    /// One chunk of program output.
    Print(String),
    /// Terminal result of the current request.
    Finished(Completion),
}

impl ContextMessage {
    /// The frame tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Print(_) => "print",
            Self::Finished(_) => "finished",
        }
    }
}

impl Serialize for ContextMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ready => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(self.tag())?;
                seq.end()
            }
            Self::Print(text) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.tag())?;
                seq.serialize_element(text)?;
                seq.end()
            }
            Self::Finished(completion) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.tag())?;
                seq.serialize_element(completion)?;
                seq.end()
            }
        }
    }
}

struct ContextMessageVisitor;

impl<'de> Visitor<'de> for ContextMessageVisitor {
    type Value = ContextMessage;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a tagged message array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let tag: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;

        let message = match tag.as_str() {
            "ready" => ContextMessage::Ready,
            "print" => ContextMessage::Print(
                seq.next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?,
            ),
            "finished" => ContextMessage::Finished(
                seq.next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?,
            ),
            other => {
                return Err(de::Error::unknown_variant(other, &["ready", "print", "finished"]));
            }
        };

        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(format!("trailing elements after `{tag}` message")));
        }
        Ok(message)
    }
}

impl<'de> Deserialize<'de> for ContextMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(ContextMessageVisitor)
    }
}

/// Encodes a context message as one JSON frame.
pub fn encode_message(message: &ContextMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes one JSON frame into a context message.
pub fn decode_message(frame: &str) -> Result<ContextMessage, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

/// Encodes a run request as one JSON frame.
pub fn encode_request(request: &RunRequest) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(request)?)
}

/// Decodes one JSON frame into a run request.
pub fn decode_request(frame: &str) -> Result<RunRequest, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}
