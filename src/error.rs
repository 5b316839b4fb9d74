//! Error types for forkcall.

use crate::codec::Thrown;
use crate::worker::WorkerFailure;
use thiserror::Error;

/// Errors raised synchronously by the caller-side API.
#[derive(Error, Debug)]
pub enum ForkError {
    #[error(
        "A function was passed in as argument {index} to '{target}'. \
         Only serializable arguments can be sent to a worker."
    )]
    InvalidArgument { target: String, index: usize },

    #[error("Arguments to '{target}' could not be serialized: {source}")]
    Unserializable {
        target: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot find target '{0}'")]
    TargetNotFound(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// How an in-flight call failed.
#[derive(Error, Debug)]
pub enum CallError {
    /// The target threw, rejected or panicked in the worker.
    #[error("{0}")]
    Rejected(Thrown),

    /// The worker went away without sending a result.
    #[error("{0}")]
    Terminated(WorkerFailure),

    /// The channel to the worker failed or carried garbage.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl CallError {
    /// The rejection payload, if the target settled negatively.
    pub fn thrown(&self) -> Option<&Thrown> {
        match self {
            Self::Rejected(thrown) => Some(thrown),
            _ => None,
        }
    }

    /// Take the rejection payload, if any.
    pub fn into_thrown(self) -> Option<Thrown> {
        match self {
            Self::Rejected(thrown) => Some(thrown),
            _ => None,
        }
    }
}

impl From<ForkError> for CallError {
    fn from(err: ForkError) -> Self {
        Self::Worker(match err {
            ForkError::Worker(message) => message,
            other => other.to_string(),
        })
    }
}

/// Result type alias for forkcall operations.
pub type Result<T> = std::result::Result<T, ForkError>;
