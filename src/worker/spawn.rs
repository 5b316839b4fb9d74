//! Worker subprocess spawning.
//!
//! Uses `posix_spawn` via `std::process::Command`. By default the worker is
//! the current executable re-entered with [`WORKER_FLAG`], so the parent and
//! the worker share the same statically registered targets.

use super::proc::Proc;
use crate::error::{ForkError, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// First argument passed to a worker process.
pub const WORKER_FLAG: &str = "--internal-worker";

/// Stack size for threads that encode or decode protocol messages (64 MiB).
///
/// The parent's collector threads and the worker's main loop run on threads
/// of this size. Protocol decoding has no nesting limit, so JSON depth is
/// bounded by this stack rather than by serde_json's default of 128.
pub const COLLECTOR_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for worker processes.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker executable (None = the current executable).
    pub program: Option<PathBuf>,
    /// Extra arguments appended after [`WORKER_FLAG`].
    pub args: Vec<OsString>,
    /// Extra environment variables for the worker.
    pub env: Vec<(OsString, OsString)>,
    /// How long a worker may linger after sending its result before it is
    /// terminated.
    pub stop_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            env: Vec::new(),
            stop_grace: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    /// Use a specific worker executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Append an argument for the worker.
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable for the worker.
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the post-result grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// Reads from:
    /// - `FORKCALL_WORKER_PROGRAM` for the worker executable
    /// - `FORKCALL_STOP_GRACE_MS` for the post-result grace period
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(program) = std::env::var("FORKCALL_WORKER_PROGRAM")
            && !program.is_empty()
        {
            self.program = Some(PathBuf::from(program));
        }

        if let Ok(ms) = std::env::var("FORKCALL_STOP_GRACE_MS")
            && let Ok(ms) = ms.trim().parse::<u64>()
        {
            self.stop_grace = Duration::from_millis(ms);
        }

        self
    }

    /// Resolve the executable to spawn.
    fn resolve_program(&self) -> Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe().map_err(|e| {
                ForkError::Worker(format!("Failed to get current executable: {}", e))
            }),
        }
    }
}

/// Whether this process was started as a worker.
pub fn is_worker_process() -> bool {
    std::env::args_os().nth(1).is_some_and(|arg| arg == WORKER_FLAG)
}

/// Spawn a worker subprocess.
///
/// The worker's stdin and stdout carry the protocol; its stderr is shared
/// with the parent for diagnostics.
pub fn spawn_worker(config: &WorkerConfig) -> Result<Proc> {
    let program = config.resolve_program()?;

    let mut cmd = Command::new(&program);
    cmd.arg(WORKER_FLAG);
    cmd.args(&config.args);
    cmd.envs(config.env.iter().map(|(k, v)| (k, v)));

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    let child = cmd.spawn().map_err(|e| {
        ForkError::Worker(format!(
            "Failed to spawn worker {}: {}",
            program.display(),
            e
        ))
    })?;

    Proc::from_child(child)
}

/// Spawn a collector thread with a large stack.
pub fn spawn_collector_thread<F, T>(name: &str, f: F) -> Result<std::thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .stack_size(COLLECTOR_STACK_SIZE)
        .spawn(f)
        .map_err(|e| ForkError::Worker(format!("Failed to spawn collector thread: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert!(config.program.is_none());
        assert!(config.args.is_empty());
        assert_eq!(config.stop_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_program("/usr/bin/true")
            .with_arg("--quiet")
            .with_env("FOO", "bar")
            .with_stop_grace(Duration::from_millis(250));

        assert_eq!(config.program, Some(PathBuf::from("/usr/bin/true")));
        assert_eq!(config.args, vec![OsString::from("--quiet")]);
        assert_eq!(config.env, vec![(OsString::from("FOO"), OsString::from("bar"))]);
        assert_eq!(config.stop_grace, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn test_worker_config_env_overrides() {
        unsafe {
            std::env::set_var("FORKCALL_WORKER_PROGRAM", "/opt/worker");
            std::env::set_var("FORKCALL_STOP_GRACE_MS", "1500");
        }
        let config = WorkerConfig::default().with_env_overrides();
        unsafe {
            std::env::remove_var("FORKCALL_WORKER_PROGRAM");
            std::env::remove_var("FORKCALL_STOP_GRACE_MS");
        }

        assert_eq!(config.program, Some(PathBuf::from("/opt/worker")));
        assert_eq!(config.stop_grace, Duration::from_millis(1500));
    }

    #[test]
    #[serial]
    fn test_worker_config_ignores_bad_grace() {
        unsafe {
            std::env::set_var("FORKCALL_STOP_GRACE_MS", "soon");
        }
        let config = WorkerConfig::default().with_env_overrides();
        unsafe {
            std::env::remove_var("FORKCALL_STOP_GRACE_MS");
        }
        assert_eq!(config.stop_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_resolve_program_defaults_to_current_exe() {
        let config = WorkerConfig::default();
        let program = config.resolve_program().unwrap();
        assert_eq!(program, std::env::current_exe().unwrap());
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let config = WorkerConfig::default().with_program("/nonexistent/forkcall-worker");
        let err = spawn_worker(&config).err().expect("spawn should fail");
        assert!(err.to_string().contains("Failed to spawn worker"));
    }

    #[test]
    fn test_test_harness_is_not_a_worker() {
        assert!(!is_worker_process());
    }
}
