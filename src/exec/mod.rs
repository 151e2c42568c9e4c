// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`executor`] owns [`ParallelExecutor`], which drives the graph wave by
//!   wave with bounded concurrency, cascades skips and sequences isolation
//!   merge/cleanup.
//! - [`runner`] defines the [`TaskRunner`] trait the executor delegates to.
//! - [`shell_runner`] is the production runner that spawns shell commands.
//! - [`options`] holds [`ExecutorOptions`] and the progress callback type.
//! - [`result`] holds per-task and per-wave result types.
//! - [`state`] is the executor's internal failure/skip/workspace bookkeeping.

pub mod executor;
pub mod options;
pub mod result;
pub mod runner;
pub mod shell_runner;
mod state;

pub use executor::{AbortedRun, ParallelExecutor};
pub use options::{DEFAULT_MAX_PARALLEL, ExecutorOptions, ProgressCallback};
pub use result::{ParallelTaskResult, RunSummary, TaskFailure, WaveResult, WaveStatus};
pub use runner::{TaskInvocation, TaskRunner};
pub use shell_runner::ShellTaskRunner;
