//! Caller-side API: bind a target, call it in a fresh worker, await the result.
//!
//! ```no_run
//! use forkcall::{Invoker, Registry, args};
//! use serde_json::{Value, json};
//!
//! fn registry() -> Registry {
//!     Registry::new().with_target("sum", |args| {
//!         Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
//!     })
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     if forkcall::is_worker_process() {
//!         forkcall::run_worker_main(registry());
//!     }
//!
//!     let invoker = Invoker::new(registry());
//!     let sum = invoker.bind("sum")?;
//!     let total = sum.call(args![1, 2, 3])?.wait()?;
//!     assert_eq!(total, json!(6));
//!     Ok(())
//! }
//! ```

use crate::error::{CallError, ForkError, Result};
use crate::registry::{Registry, TargetResult};
use crate::worker::{
    Proc, TerminationReason, WorkRequest, WorkResponse, WorkerConfig, WorkerFailure,
    analyze_wait_status, spawn_collector_thread, spawn_worker,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, instrument, trace, warn};

/// A callable that cannot cross a process boundary.
pub type Callback = Arc<dyn Fn(Vec<Value>) -> TargetResult + Send + Sync>;

/// One positional argument to a call.
#[derive(Clone)]
pub enum Argument {
    /// Plain data, sent to the worker as JSON.
    Data(Value),
    /// A function value. Always rejected by [`RemoteFn::call`].
    Function(Callback),
}

impl Argument {
    /// Wrap a function value.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> TargetResult + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// Whether this argument is a function value.
    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Self::Function(_) => write!(f, "Function(..)"),
        }
    }
}

macro_rules! impl_argument_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Argument {
                fn from(value: $ty) -> Self {
                    Self::Data(Value::from(value))
                }
            }
        )*
    };
}

impl_argument_from!(Value, String, &str, bool, i32, i64, u32, u64, f64, Vec<Value>);

/// Build a `Vec<Argument>` from a list of values.
///
/// ```
/// use forkcall::{Argument, args};
///
/// let list: Vec<Argument> = args![1, "two", serde_json::json!({"three": 3})];
/// assert_eq!(list.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Argument>::new() };
    ($($arg:expr),+ $(,)?) => { ::std::vec![$($crate::Argument::from($arg)),+] };
}

/// Reject function values, keeping the rest in order.
fn validate_arguments(target: &str, args: Vec<Argument>) -> Result<Vec<Value>> {
    args.into_iter()
        .enumerate()
        .map(|(index, arg)| match arg {
            Argument::Data(value) => Ok(value),
            Argument::Function(_) => Err(ForkError::InvalidArgument {
                target: target.to_string(),
                index,
            }),
        })
        .collect()
}

/// Spawns one worker per call for targets of a [`Registry`].
#[derive(Debug, Clone)]
pub struct Invoker {
    registry: Arc<Registry>,
    config: Arc<WorkerConfig>,
}

impl Invoker {
    /// Create an invoker whose workers are the current executable.
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, WorkerConfig::default())
    }

    /// Create an invoker with an explicit worker configuration.
    pub fn with_config(registry: Registry, config: WorkerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    /// The registry used to check target names.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Bind a target by name.
    ///
    /// Fails immediately with [`ForkError::TargetNotFound`] if no target of
    /// that name is registered; no process is spawned.
    pub fn bind(&self, name: &str) -> Result<RemoteFn> {
        if !self.registry.contains(name) {
            return Err(ForkError::TargetNotFound(name.to_string()));
        }
        Ok(RemoteFn {
            name: name.to_string(),
            config: Arc::clone(&self.config),
        })
    }

    /// Bind and call in one step.
    pub fn call(&self, name: &str, args: Vec<Argument>) -> Result<CallHandle> {
        self.bind(name)?.call(args)
    }
}

/// A bound target. Each call runs in its own worker process.
#[derive(Debug, Clone)]
pub struct RemoteFn {
    name: String,
    config: Arc<WorkerConfig>,
}

impl RemoteFn {
    /// Name of the bound target.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the target with positional arguments.
    ///
    /// Returns an error right away, without spawning, if any argument is a
    /// function value or the worker cannot be started.
    pub fn call(&self, args: Vec<Argument>) -> Result<CallHandle> {
        let arguments = validate_arguments(&self.name, args)?;
        self.dispatch(arguments)
    }

    /// Call the target with any serializable arguments.
    ///
    /// Tuples and sequences are spread into positional arguments, `()` means
    /// no arguments, and any other value is passed as a single argument.
    pub fn call_serialize<A: Serialize>(&self, args: A) -> Result<CallHandle> {
        let value = serde_json::to_value(args).map_err(|source| ForkError::Unserializable {
            target: self.name.clone(),
            source,
        })?;
        let arguments = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        self.dispatch(arguments)
    }

    #[instrument(level = "debug", skip(self, arguments), fields(function = %self.name, args = arguments.len()))]
    fn dispatch(&self, arguments: Vec<Value>) -> Result<CallHandle> {
        let mut proc = spawn_worker(&self.config)?;
        let pid = proc.pid().as_raw();
        debug!(pid, "Spawned worker");

        let (tx, rx) = oneshot::channel();
        let request = WorkRequest::invoke(self.name.clone(), arguments);
        let name = self.name.clone();
        let grace = self.config.stop_grace;

        spawn_collector_thread(&format!("forkcall-{}", pid), move || {
            let result = collect(&mut proc, &request, &name, grace);
            // The caller may have dropped its handle; the worker is reaped regardless.
            let _ = tx.send(result);

            if proc.is_running()
                && let Err(e) = proc.stop(grace)
            {
                warn!(pid, error = %e, "Failed to stop worker");
            }
        })?;

        Ok(CallHandle {
            pid,
            target: self.name.clone(),
            rx,
        })
    }
}

/// Drive one worker from request to settled result.
fn collect(
    proc: &mut Proc,
    request: &WorkRequest,
    name: &str,
    grace: Duration,
) -> std::result::Result<Value, CallError> {
    let start = Instant::now();

    if let Err(e) = proc.send(request) {
        // A worker that dies before reading its request breaks the pipe.
        return Err(worker_death(proc, name, grace, e.to_string()));
    }
    let send_time = start.elapsed();

    loop {
        match proc.recv() {
            Ok(Some(WorkResponse::Result { outcome })) => {
                trace!(
                    pid = proc.pid().as_raw(),
                    state = outcome.state(),
                    send_time_ms = send_time.as_millis() as u64,
                    total_time_ms = start.elapsed().as_millis() as u64,
                    "Worker settled"
                );
                return outcome.into_result().map_err(CallError::Rejected);
            }
            Ok(Some(WorkResponse::Unknown)) => {
                trace!(pid = proc.pid().as_raw(), "Ignoring non-result message from worker");
            }
            Ok(None) => {
                return Err(worker_death(proc, name, grace, "no result received"));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Reap a worker that went away without answering and describe why.
fn worker_death(proc: &mut Proc, name: &str, grace: Duration, message: impl Into<String>) -> CallError {
    let pid = proc.pid().as_raw();
    let reason = match proc.stop(grace) {
        Ok(status) => analyze_wait_status(status),
        Err(_) => TerminationReason::Unknown,
    };

    let failure = WorkerFailure::new(reason)
        .with_pid(pid)
        .with_context(format!("invoking '{}'", name))
        .with_message(message);

    warn!(pid, reason = %failure.reason, function = %name, "Worker died unexpectedly");
    CallError::Terminated(failure)
}

fn collector_gone() -> CallError {
    CallError::Worker("Collector thread exited without a result".into())
}

/// Asynchronous result of a single call.
///
/// Await it on any executor, or block on it with [`CallHandle::wait`].
/// Dropping the handle does not stop the worker.
#[derive(Debug)]
pub struct CallHandle {
    pid: i32,
    target: String,
    rx: oneshot::Receiver<std::result::Result<Value, CallError>>,
}

impl CallHandle {
    /// Process ID of the worker running this call.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Name of the target being called.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Block the current thread until the call settles.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous runtime; `.await` the
    /// handle there instead.
    pub fn wait(self) -> std::result::Result<Value, CallError> {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(collector_gone()))
    }
}

impl Future for CallHandle {
    type Output = std::result::Result<Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(collector_gone())))
    }
}
