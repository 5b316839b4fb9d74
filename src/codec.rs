//! Error codec for values thrown across the process boundary.
//!
//! A target either fails with a native error (something that implements
//! [`std::error::Error`]) or rejects with an arbitrary JSON value. The two
//! are kept apart on the wire so the caller sees exactly what was thrown:
//! errors come back as [`NativeError`] with name, message and stack intact,
//! raw values come back as the same JSON value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

/// An error reconstructed from its transported form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeError {
    /// Display name of the error type (e.g. "Error", "Panic").
    pub name: String,
    /// Error message.
    pub message: String,
    /// Rendered stack: the error line, its source chain and an optional backtrace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl NativeError {
    /// Create an error with a name and message and no stack.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Encode any error value.
    ///
    /// A `NativeError` passes through unchanged so errors decoded from an
    /// earlier hop keep their original name and stack.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        if let Some(native) = (err as &dyn Any).downcast_ref::<NativeError>() {
            return native.clone();
        }

        let name = short_type_name::<E>();
        let message = err.to_string();
        let stack = render_stack(&name, &message, err.source(), &Backtrace::capture());
        Self {
            name,
            message,
            stack: Some(stack),
        }
    }

    /// Encode a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        let stack = format!("Panic: {}", message);
        Self::new("Panic", message).with_stack(stack)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for NativeError {}

/// Last path segment of a type name, without generic parameters.
fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

fn render_stack(
    name: &str,
    message: &str,
    mut source: Option<&(dyn std::error::Error + 'static)>,
    backtrace: &Backtrace,
) -> String {
    let mut stack = format!("{}: {}", name, message);
    while let Some(cause) = source {
        stack.push_str("\n    caused by: ");
        stack.push_str(&cause.to_string());
        source = cause.source();
    }

    if backtrace.status() == BacktraceStatus::Captured {
        stack.push('\n');
        stack.push_str(&backtrace.to_string());
    }
    stack
}

/// A value thrown or rejected by a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Thrown {
    /// A native error; name, message and stack survive the trip.
    Error(NativeError),
    /// Any other value, transported verbatim.
    Value(Value),
}

impl Thrown {
    /// Throw an error value.
    pub fn error<E>(err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Error(NativeError::from_error(&err))
    }

    /// Throw a named error.
    pub fn native(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(NativeError::new(name, message))
    }

    /// Throw a raw value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Whether this payload is error-kind.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The native error, if this is one.
    pub fn as_error(&self) -> Option<&NativeError> {
        match self {
            Self::Error(err) => Some(err),
            Self::Value(_) => None,
        }
    }

    /// The raw value, if this is not an error.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Error(_) => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "{}", err),
            Self::Value(Value::String(s)) => write!(f, "{}", s),
            Self::Value(value) => write!(f, "{}", value),
        }
    }
}

impl std::error::Error for Thrown {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Error(err) => Some(err),
            Self::Value(_) => None,
        }
    }
}

impl From<NativeError> for Thrown {
    fn from(err: NativeError) -> Self {
        Self::Error(err)
    }
}

impl From<anyhow::Error> for Thrown {
    fn from(err: anyhow::Error) -> Self {
        if let Some(native) = err.downcast_ref::<NativeError>() {
            return Self::Error(native.clone());
        }
        let message = err.to_string();
        let stack = render_stack("Error", &message, err.chain().nth(1), err.backtrace());
        Self::Error(NativeError::new("Error", message).with_stack(stack))
    }
}

impl From<Value> for Thrown {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<String> for Thrown {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<&str> for Thrown {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

/// Settled outcome of a single invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    /// The target returned a value.
    Resolved { value: Value },
    /// The target failed, rejected or panicked.
    Rejected { reason: Thrown },
}

impl Outcome {
    /// Build an outcome from a target's return value.
    pub fn settle(result: std::result::Result<Value, Thrown>) -> Self {
        match result {
            Ok(value) => Self::Resolved { value },
            Err(reason) => Self::Rejected { reason },
        }
    }

    /// Convert back into a result.
    pub fn into_result(self) -> std::result::Result<Value, Thrown> {
        match self {
            Self::Resolved { value } => Ok(value),
            Self::Rejected { reason } => Err(reason),
        }
    }

    /// Short state label for logs.
    pub fn state(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "resolved",
            Self::Rejected { .. } => "rejected",
        }
    }
}
