//! Process handle for worker subprocesses.
//!
//! Wraps a child process with IPC channels for communication.

use super::ipc::{LineReader, LineWriter, PipeFd};
use super::protocol::{WorkRequest, WorkResponse};
use crate::error::{ForkError, Result};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::time::{Duration, Instant};

/// Handle to a worker subprocess with IPC channels.
pub struct Proc {
    /// Process ID
    pid: Pid,
    /// Writer for sending the request to the worker (None once closed)
    writer: Option<LineWriter>,
    /// Reader for receiving responses from the worker
    reader: LineReader,
    /// Whether the process has been reaped
    reaped: bool,
}

impl Proc {
    /// Create a new process handle from its components.
    pub fn new(pid: Pid, stdin: PipeFd, stdout: PipeFd) -> Self {
        Self {
            pid,
            writer: Some(LineWriter::new(stdin)),
            reader: LineReader::new(stdout),
            reaped: false,
        }
    }

    /// Create from a spawned `std::process::Child`.
    ///
    /// Takes ownership of the child's stdin and stdout.
    pub fn from_child(mut child: std::process::Child) -> Result<Self> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ForkError::Worker("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ForkError::Worker("Child stdout not captured".into()))?;

        Ok(Self::new(pid, PipeFd::from(stdin), PipeFd::from(stdout)))
    }

    /// Get the process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Send the request to the worker and close the request channel.
    ///
    /// Workers take exactly one request, so the write end is closed right
    /// after sending. A worker still waiting for input sees EOF.
    pub fn send(&mut self, request: &WorkRequest) -> Result<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| ForkError::Worker("Request already sent to worker".into()))?;
        writer
            .write_message(request)
            .and_then(|()| writer.close())
            .map_err(|e| ForkError::Worker(format!("Failed to send to worker: {}", e)))
    }

    /// Receive a response from the worker.
    ///
    /// Returns `None` if the worker closed its stdout (EOF).
    pub fn recv(&mut self) -> Result<Option<WorkResponse>> {
        match self.reader.read_line() {
            Ok(Some(line)) => {
                let response = WorkResponse::from_line(line)
                    .map_err(|e| ForkError::Worker(format!("Invalid worker response: {}", e)))?;
                Ok(Some(response))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ForkError::Worker(format!(
                "Failed to receive from worker: {}",
                e
            ))),
        }
    }

    /// Check if the process is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Wait for the process to exit (blocking).
    pub fn wait(&mut self) -> Result<WaitStatus> {
        if self.reaped {
            return Err(ForkError::Worker("Process already reaped".into()));
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::StillAlive) => continue,
                Ok(status) => {
                    self.reaped = true;
                    return Ok(status);
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    self.reaped = true;
                    return Err(ForkError::Worker(format!("waitpid failed: {}", e)));
                }
            }
        }
    }

    /// Try to wait for the process (non-blocking).
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&mut self) -> Result<Option<WaitStatus>> {
        if self.reaped {
            return Err(ForkError::Worker("Process already reaped".into()));
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => {
                self.reaped = true;
                Ok(Some(status))
            }
            Err(e) => {
                self.reaped = true;
                Err(ForkError::Worker(format!("waitpid failed: {}", e)))
            }
        }
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM)
            .map_err(|e| ForkError::Worker(format!("Failed to send SIGTERM: {}", e)))
    }

    /// Send SIGKILL to the process and wait for it to exit.
    pub fn kill(&mut self) -> Result<WaitStatus> {
        if !self.reaped {
            signal::kill(self.pid, Signal::SIGKILL)
                .map_err(|e| ForkError::Worker(format!("Failed to send SIGKILL: {}", e)))?;
        }
        self.wait()
    }

    /// Wait up to `grace` for the worker to exit on its own, then escalate
    /// to SIGTERM and finally SIGKILL. Always reaps the process.
    pub fn stop(&mut self, grace: Duration) -> Result<WaitStatus> {
        let start = Instant::now();
        while start.elapsed() < grace {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        tracing::debug!(pid = self.pid.as_raw(), "Worker did not exit after result, terminating");
        let _ = self.terminate();

        std::thread::sleep(Duration::from_millis(100));
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }

        self.kill()
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.terminate();
            std::thread::sleep(Duration::from_millis(10));

            if let Ok(Some(_)) = self.try_wait() {
                return;
            }

            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
            self.reaped = true;
        }
    }
}
