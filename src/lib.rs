//! forkcall - run a function call in an isolated, short-lived worker process.
//!
//! A host program registers its callable targets in a [`Registry`] and
//! checks [`is_worker_process`] first thing in `main`. When the program is
//! re-executed as a worker it hands control to [`run_worker_main`]; otherwise
//! it builds an [`Invoker`] and calls targets by name. Every call spawns its
//! own worker, which runs exactly one target and exits.
//!
//! Results come back as a [`CallHandle`] that can be awaited or blocked on.
//! A target that fails settles the call with [`CallError::Rejected`], keeping
//! the distinction between an error ([`Thrown::Error`]) and any other thrown
//! value ([`Thrown::Value`]). A worker that crashes settles it with
//! [`CallError::Terminated`].

pub mod cli;
pub mod codec;
pub mod demo;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod registry;
pub mod worker;

pub use codec::{NativeError, Outcome, Thrown};
pub use error::{CallError, ForkError, Result};
pub use invoker::{Argument, CallHandle, Invoker, RemoteFn};
pub use registry::{Registry, Target, TargetResult};
pub use worker::{WorkerConfig, is_worker_process, run_worker_main};
