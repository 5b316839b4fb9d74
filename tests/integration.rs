//! Integration tests for the forkcall CLI.
//!
//! Every `call` spawns the binary itself as the worker, so these tests cover
//! the whole round trip: argument parsing, the pipe protocol and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

/// Get a command for the forkcall binary.
fn forkcall() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("forkcall").unwrap();
    cmd.env_remove("FORKCALL_LOG")
        .env_remove("FORKCALL_LOG_FILE")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help() {
    forkcall()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("targets"));
}

#[test]
fn test_version() {
    forkcall()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_targets_lists_demo_registry() {
    forkcall()
        .arg("targets")
        .assert()
        .success()
        .stdout(predicate::str::contains("echo"))
        .stdout(predicate::str::contains("sum"))
        .stdout(predicate::str::contains("reject-string"));
}

#[test]
fn test_call_echo() {
    forkcall()
        .args(["call", "echo", "test"])
        .assert()
        .success()
        .stdout("\"test\"\n");
}

#[test]
fn test_call_sum() {
    forkcall()
        .args(["call", "sum", "1", "2", "3"])
        .assert()
        .success()
        .stdout("6\n");
}

#[test]
fn test_call_json_argument_pretty() {
    forkcall()
        .args(["call", "--pretty", "echo", r#"{"a":[1,2]}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"a\": [\n"));
}

#[test]
fn test_call_error_rejection() {
    forkcall()
        .args(["call", "fail"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error: Error: Something broke."));
}

#[test]
fn test_call_string_rejection() {
    forkcall()
        .args(["call", "reject-string"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: Something broke."));
}

#[test]
fn test_call_unknown_target() {
    forkcall()
        .args(["call", "no-target-here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot find target 'no-target-here'"));
}

#[test]
fn test_call_panic_is_reported() {
    forkcall()
        .args(["call", "panic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Panic: Something broke."));
}

#[test]
fn test_call_abort_is_reported() {
    forkcall()
        .args(["call", "abort"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("terminated unexpectedly"))
        .stderr(predicate::str::contains("aborted"));
}

#[test]
fn test_quiet_conflicts_with_verbose() {
    forkcall()
        .args(["-q", "-v", "targets"])
        .assert()
        .failure();
}

#[test]
fn test_verbose_logs_go_to_stderr() {
    forkcall()
        .args(["-vv", "--log-format", "compact", "call", "sum", "2", "2"])
        .assert()
        .success()
        .stdout("4\n")
        .stderr(predicate::str::contains("Spawned worker"));
}

#[test]
fn test_log_file() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("forkcall.log");

    forkcall()
        .env("FORKCALL_LOG_FILE", &log_path)
        .args(["-v", "call", "echo", "logged"])
        .assert()
        .success()
        .stdout("\"logged\"\n");

    // The rolling appender adds a date suffix to the file name.
    let written: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("forkcall.log"))
        .collect();
    assert!(!written.is_empty(), "no log file written in {}", dir.path().display());

    let contents = std::fs::read_to_string(written[0].path()).unwrap();
    assert!(contents.contains("Worker started"));
}
