//! Termination analysis for worker processes.
//!
//! A worker that exits before sending its result leaves only a wait status
//! behind. This module turns that status into something a caller can act on.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by SIGKILL (OOM killer or an external kill).
    Killed,
    /// Memory fault (SIGSEGV or SIGBUS), usually a stack overflow.
    Crashed(Signal),
    /// Aborted (SIGABRT), e.g. `std::process::abort` or a double panic.
    Aborted,
    /// Killed by some other signal.
    Signaled(Signal),
    /// Process is still running.
    StillAlive,
    /// Status could not be determined.
    Unknown,
}

impl TerminationReason {
    /// Check if this is a clean exit.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Killed => "was killed (SIGKILL, possibly out of memory)".to_string(),
            Self::Crashed(sig) => format!("crashed ({:?}, possibly a stack overflow)", sig),
            Self::Aborted => "aborted (SIGABRT)".to_string(),
            Self::Signaled(sig) => format!("was killed by signal {:?}", sig),
            Self::StillAlive => "is still running".to_string(),
            Self::Unknown => "terminated for an unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, _) => match signal {
            Signal::SIGKILL => TerminationReason::Killed,
            Signal::SIGSEGV | Signal::SIGBUS => TerminationReason::Crashed(signal),
            Signal::SIGABRT => TerminationReason::Aborted,
            _ => TerminationReason::Signaled(signal),
        },
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Unknown,
    }
}

/// A worker that went away without delivering a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    /// Why the worker terminated.
    pub reason: TerminationReason,
    /// Process ID of the worker.
    pub pid: Option<i32>,
    /// What the worker was doing when it failed.
    pub context: Option<String>,
    /// Additional error message.
    pub message: Option<String>,
}

impl WorkerFailure {
    /// Create a new worker failure.
    pub fn new(reason: TerminationReason) -> Self {
        Self {
            reason,
            pid: None,
            context: None,
            message: None,
        }
    }

    /// Record the worker's process ID.
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Add context about what the worker was doing.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add an error message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Worker")?;
        if let Some(pid) = self.pid {
            write!(f, " {}", pid)?;
        }
        write!(f, " terminated unexpectedly: {}", self.reason)?;
        if let Some(ctx) = &self.context {
            write!(f, " while {}", ctx)?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}
