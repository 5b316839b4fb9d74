//! IPC protocol for worker subprocess communication.
//!
//! Messages are JSON-serialized and newline-delimited. Exactly one request
//! and at most one response cross the channel during a worker's lifetime.
//!
//! Decoding has no nesting limit; both ends decode on threads sized by
//! `COLLECTOR_STACK_SIZE`.

use crate::codec::Outcome;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind tag of the invocation request.
const INVOKE_KIND: &str = "invoke";

/// Decode one JSON line without serde_json's recursion limit.
fn from_json_line<T: DeserializeOwned>(line: &str) -> Result<T, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_str(line.trim());
    de.disable_recursion_limit();
    let value = T::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Just the `kind` tag of a message; unknown fields are skipped.
#[derive(Deserialize)]
struct KindOnly {
    kind: String,
}

/// Request from parent to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WorkRequest {
    /// Invoke a registered target with the given arguments.
    #[serde(rename = "invoke")]
    Invoke {
        /// Registry key of the target.
        target: String,
        /// Positional arguments.
        arguments: Vec<Value>,
    },

    /// Any other message kind. Workers ignore these.
    #[serde(other)]
    Unknown,
}

/// Response from worker to parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WorkResponse {
    /// Settled outcome of the invocation.
    #[serde(rename = "result")]
    Result {
        /// Resolved value or rejection reason.
        outcome: Outcome,
    },

    /// Any other message kind. The invoker ignores these.
    #[serde(other)]
    Unknown,
}

impl WorkRequest {
    /// Create an invocation request.
    pub fn invoke(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Invoke {
            target: target.into(),
            arguments,
        }
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        from_json_line(line)
    }

    /// Whether a line is tagged as an invocation, whether or not the rest of
    /// it decodes.
    pub fn is_invoke_line(line: &str) -> bool {
        from_json_line::<KindOnly>(line).is_ok_and(|msg| msg.kind == INVOKE_KIND)
    }
}

impl WorkResponse {
    /// Create a result response.
    pub fn result(outcome: Outcome) -> Self {
        Self::Result { outcome }
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        from_json_line(line)
    }
}
