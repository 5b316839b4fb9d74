//! Worker subprocess main entry point.
//!
//! Runs when the executable is started with `--internal-worker`. The worker
//! reads one invocation from stdin, runs the target from its own registry,
//! writes one result to stdout and exits.

use super::ipc::{LineReader, LineWriter, PipeFd};
use super::protocol::{WorkRequest, WorkResponse};
use super::spawn::spawn_collector_thread;
use crate::codec::{NativeError, Outcome, Thrown};
use crate::error::ForkError;
use crate::logging::{self, LogConfig};
use crate::registry::{Registry, Target};
use serde_json::Value;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, trace};

/// Error name used when the worker's registry lacks the requested target.
pub const TARGET_NOT_FOUND: &str = "TargetNotFoundError";

/// Error name used when an invocation arrives but cannot be decoded.
pub const INVALID_INVOCATION: &str = "InvalidInvocationError";

/// Run a target and capture how it settled.
///
/// Panics are caught and reported as `Panic` errors; asynchronous targets
/// are driven on a fresh current-thread runtime.
pub fn invoke(registry: &Registry, name: &str, arguments: Vec<Value>) -> Outcome {
    let Some(target) = registry.get(name) else {
        let message = ForkError::TargetNotFound(name.to_string()).to_string();
        return Outcome::Rejected {
            reason: Thrown::Error(NativeError::new(TARGET_NOT_FOUND, message)),
        };
    };

    debug!(name = %name, args = arguments.len(), is_async = target.is_async(), "Invoking target");

    let settled = match target {
        Target::Sync(f) => catch_unwind(AssertUnwindSafe(|| f(arguments))),
        Target::Async(f) => {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => return Outcome::settle(Err(Thrown::error(e))),
            };
            catch_unwind(AssertUnwindSafe(|| runtime.block_on(f(arguments))))
        }
    };

    match settled {
        Ok(result) => Outcome::settle(result),
        Err(payload) => Outcome::Rejected {
            reason: Thrown::Error(NativeError::from_panic(payload.as_ref())),
        },
    }
}

/// Worker main loop.
///
/// Waits for the invocation, ignoring any other message, then answers it
/// and closes stdout. An invocation that fails to decode is answered with an
/// [`INVALID_INVOCATION`] rejection.
fn worker_loop(registry: &Registry, reader: &mut LineReader, mut writer: LineWriter) -> io::Result<()> {
    loop {
        let Some(line) = reader.read_line()? else {
            debug!("Parent closed the channel before sending an invocation");
            return Ok(());
        };

        let outcome = match WorkRequest::from_line(line) {
            Ok(WorkRequest::Invoke { target, arguments }) => {
                let outcome = invoke(registry, &target, arguments);
                trace!(name = %target, state = outcome.state(), "Sending result");
                outcome
            }
            Ok(WorkRequest::Unknown) => {
                trace!("Ignoring non-invocation message");
                continue;
            }
            Err(e) if WorkRequest::is_invoke_line(line) => {
                debug!(error = %e, "Rejecting malformed invocation");
                Outcome::Rejected {
                    reason: Thrown::Error(NativeError::new(
                        INVALID_INVOCATION,
                        format!("Malformed invocation: {}", e),
                    )),
                }
            }
            Err(e) => {
                debug!(error = %e, "Ignoring malformed message");
                continue;
            }
        };

        writer.write_message(&WorkResponse::result(outcome))?;
        return writer.close();
    }
}

/// Run the worker subprocess main function.
///
/// Never returns: the process exits with status 0 once the result is sent
/// and with status 1 if the channel fails.
pub fn run_worker_main(registry: Registry) -> ! {
    // Ignore SIGPIPE - a vanished parent shows up as an io::Error
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigIgn,
        )
        .ok();
    }

    logging::init_with_file(LogConfig::for_worker().with_env_overrides());

    // Safety: file descriptors 0 and 1 are the pipes set up by the spawner
    // and nothing else in this process owns them.
    let stdin_fd = unsafe { PipeFd::from_raw(0) };
    let stdout_fd = unsafe { PipeFd::from_raw(1) };

    let mut reader = LineReader::new(stdin_fd);
    let writer = LineWriter::new(stdout_fd);

    // Decoding, the target and encoding all run on a large stack.
    let result = spawn_collector_thread("forkcall-worker", move || {
        worker_loop(&registry, &mut reader, writer)
    })
    .map_err(|e| io::Error::other(e.to_string()))
    .and_then(|handle| {
        handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("Worker thread panicked")))
    });

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "Worker channel failed");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn registry() -> Registry {
        Registry::new()
            .with_target("sum", |args| {
                Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
            })
            .with_target("throw", |_| Err(Thrown::native("RangeError", "out of range")))
            .with_target("reject-string", |_| Err(Thrown::from("nope")))
            .with_target("panic", |_| panic!("worker target panicked"))
            .with_async_target("later", |args| async move {
                tokio::task::yield_now().await;
                Ok::<_, Thrown>(args.into_iter().next().unwrap_or(Value::Null))
            })
            .with_async_target("later-panic", |_| async move {
                tokio::task::yield_now().await;
                if true {
                    panic!("async boom");
                }
                Ok::<_, Thrown>(Value::Null)
            })
    }

    fn pipe() -> (PipeFd, PipeFd) {
        let (read_fd, write_fd) = nix::unistd::pipe().expect("Failed to create pipe");
        (PipeFd::new(read_fd), PipeFd::new(write_fd))
    }

    #[test]
    fn test_invoke_sync_resolves() {
        let outcome = invoke(&registry(), "sum", vec![json!(1), json!(2), json!(3)]);
        assert_eq!(outcome, Outcome::Resolved { value: json!(6) });
    }

    #[test]
    fn test_invoke_async_resolves() {
        let outcome = invoke(&registry(), "later", vec![json!("test")]);
        assert_eq!(outcome, Outcome::Resolved { value: json!("test") });
    }

    #[test]
    fn test_invoke_error_and_raw_rejections() {
        match invoke(&registry(), "throw", vec![]) {
            Outcome::Rejected { reason: Thrown::Error(err) } => {
                assert_eq!(err.name, "RangeError");
                assert_eq!(err.message, "out of range");
            }
            other => panic!("Expected error rejection, got {:?}", other),
        }

        assert_eq!(
            invoke(&registry(), "reject-string", vec![]),
            Outcome::Rejected { reason: Thrown::Value(json!("nope")) }
        );
    }

    #[test]
    fn test_invoke_catches_panics() {
        for name in ["panic", "later-panic"] {
            match invoke(&registry(), name, vec![]) {
                Outcome::Rejected { reason: Thrown::Error(err) } => {
                    assert_eq!(err.name, "Panic");
                    assert!(err.message.contains("boom") || err.message.contains("panicked"));
                }
                other => panic!("Expected panic rejection, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_invoke_unknown_target() {
        match invoke(&registry(), "missing", vec![]) {
            Outcome::Rejected { reason: Thrown::Error(err) } => {
                assert_eq!(err.name, TARGET_NOT_FOUND);
                assert!(err.message.contains("Cannot find target 'missing'"));
            }
            other => panic!("Expected not-found rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_worker_loop_skips_noise_and_answers_once() {
        let (request_read, mut request_write) = pipe();
        let (response_read, response_write) = pipe();

        request_write
            .write_all(b"garbage\n{\"kind\":\"ping\"}\n{\"kind\":\"invoke\",\"target\":\"sum\",\"arguments\":[2,3]}\n")
            .unwrap();
        drop(request_write);

        let mut reader = LineReader::new(request_read);
        worker_loop(&registry(), &mut reader, LineWriter::new(response_write)).unwrap();

        let mut responses = LineReader::new(response_read);
        let line = responses.read_line().unwrap().unwrap().to_string();
        assert_eq!(
            WorkResponse::from_line(&line).unwrap(),
            WorkResponse::result(Outcome::Resolved { value: json!(5) })
        );
        assert_eq!(responses.read_line().unwrap(), None);
    }

    #[test]
    fn test_worker_loop_rejects_undecodable_invocation() {
        let (request_read, mut request_write) = pipe();
        let (response_read, response_write) = pipe();

        request_write
            .write_all(b"{\"kind\":\"ping\"}\n{\"kind\":\"invoke\",\"target\":5}\n")
            .unwrap();
        drop(request_write);

        let mut reader = LineReader::new(request_read);
        worker_loop(&registry(), &mut reader, LineWriter::new(response_write)).unwrap();

        let mut responses = LineReader::new(response_read);
        let line = responses.read_line().unwrap().unwrap().to_string();
        match WorkResponse::from_line(&line).unwrap() {
            WorkResponse::Result {
                outcome: Outcome::Rejected { reason: Thrown::Error(err) },
            } => {
                assert_eq!(err.name, INVALID_INVOCATION);
                assert!(err.message.starts_with("Malformed invocation"));
            }
            other => panic!("Expected invalid-invocation rejection, got {:?}", other),
        }
        assert_eq!(responses.read_line().unwrap(), None);
    }

    #[test]
    fn test_worker_loop_exits_quietly_on_eof() {
        let (request_read, request_write) = pipe();
        let (response_read, response_write) = pipe();
        drop(request_write);

        let mut reader = LineReader::new(request_read);
        worker_loop(&registry(), &mut reader, LineWriter::new(response_write)).unwrap();

        let mut responses = LineReader::new(response_read);
        assert_eq!(responses.read_line().unwrap(), None);
    }
}
