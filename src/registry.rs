//! Statically registered call targets.
//!
//! Worker processes cannot receive code from their parent, only a name. Both
//! sides therefore build the same [`Registry`] at startup: the parent uses it
//! to reject unknown names before spawning, the worker uses it to find the
//! function to run.

use crate::codec::Thrown;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a target returns: a value, or something thrown.
pub type TargetResult = Result<Value, Thrown>;

/// Boxed future returned by asynchronous targets.
pub type TargetFuture = Pin<Box<dyn Future<Output = TargetResult> + Send + 'static>>;

type SyncFn = dyn Fn(Vec<Value>) -> TargetResult + Send + Sync;
type AsyncFn = dyn Fn(Vec<Value>) -> TargetFuture + Send + Sync;

/// A registered callable.
#[derive(Clone)]
pub enum Target {
    /// Returns as soon as it is called.
    Sync(Arc<SyncFn>),
    /// Settles when its future completes.
    Async(Arc<AsyncFn>),
}

impl Target {
    /// Whether the target is asynchronous.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => write!(f, "Target::Sync"),
            Self::Async(_) => write!(f, "Target::Async"),
        }
    }
}

/// Table of callable targets keyed by name.
#[derive(Clone, Default)]
pub struct Registry {
    targets: BTreeMap<String, Target>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous target.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn with_target<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> TargetResult + Send + Sync + 'static,
    {
        self.targets.insert(name.into(), Target::Sync(Arc::new(f)));
        self
    }

    /// Register an asynchronous target.
    pub fn with_async_target<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TargetResult> + Send + 'static,
    {
        let boxed = move |args: Vec<Value>| -> TargetFuture { Box::pin(f(args)) };
        self.targets
            .insert(name.into(), Target::Async(Arc::new(boxed)));
        self
    }

    /// Look up a target by name.
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// Whether a target is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.targets.iter()).finish()
    }
}
