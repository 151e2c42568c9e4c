// src/exec/runner.rs

//! Pluggable task runner abstraction.
//!
//! The executor never does a task's work itself; it hands each runnable task
//! to a [`TaskRunner`]. Production code uses
//! [`ShellTaskRunner`](crate::exec::ShellTaskRunner); tests provide their own
//! implementation that records calls and scripts outcomes.

use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::types::{BoxFuture, RunContext};

/// Everything a runner is told about one task execution.
#[derive(Debug, Clone, Copy)]
pub struct TaskInvocation<'a> {
    pub task_id: &'a str,
    pub context: &'a RunContext,
    /// Isolation workspace for this task, when one was created.
    pub workdir: Option<&'a Path>,
}

/// Executes the actual work of a task.
///
/// Any returned error is a failure of that task only. Implementations must
/// watch `cancel` and return promptly once it fires; the executor never
/// aborts a runner future itself.
pub trait TaskRunner: Send + Sync {
    fn run_task<'a>(
        &'a self,
        cancel: CancellationToken,
        task: TaskInvocation<'a>,
    ) -> BoxFuture<'a, Result<()>>;
}
