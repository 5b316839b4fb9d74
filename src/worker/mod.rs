//! Single-use worker subprocesses.
//!
//! Every call gets a fresh process. The parent writes one invocation to the
//! worker's stdin and reads one result from its stdout; the worker exits as
//! soon as the result is written.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────┐   {"kind":"invoke",...}   ┌──────────────────┐
//!   │  Parent process  │ ────────── stdin ───────▶ │  Worker process  │
//!   │  (Invoker +      │                           │  (own registry,  │
//!   │   collector      │ ◀───────── stdout ─────── │   own memory)    │
//!   │   thread)        │   {"kind":"result",...}   │                  │
//!   └──────────────────┘                           └──────────────────┘
//! ```
//!
//! # Features
//!
//! - **Process isolation**: a crash, leak or hang in the target never
//!   touches the caller's address space
//! - **Crash reporting**: a worker that dies without answering is reaped and
//!   its wait status analyzed
//! - **Guaranteed exit**: a worker that lingers after answering is
//!   terminated and reaped

mod ipc;
mod proc;
mod protocol;
mod signals;
mod spawn;
mod worker_main;

pub(crate) use proc::Proc;
pub use protocol::{WorkRequest, WorkResponse};
pub use signals::{TerminationReason, WorkerFailure, analyze_wait_status};
pub use spawn::{WORKER_FLAG, WorkerConfig, is_worker_process};
pub(crate) use spawn::{spawn_collector_thread, spawn_worker};
pub use worker_main::{INVALID_INVOCATION, TARGET_NOT_FOUND, invoke, run_worker_main};
