// src/exec/options.rs

//! Executor configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::dag::NodeStatus;
use crate::exec::runner::TaskRunner;
use crate::isolation::IsolationManager;

/// Default number of tasks allowed to run at once within a wave.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default directory (relative to the isolation manager's root) under which
/// per-task workspaces are created.
pub const DEFAULT_WORKTREE_ROOT: &str = ".wavedag/worktrees";

/// Progress hook: `(wave, task_id, status, rendered_progress_line)`.
///
/// Called synchronously on every task status transition; keep it cheap.
pub type ProgressCallback = Arc<dyn Fn(usize, &str, NodeStatus, &str) + Send + Sync>;

/// Configuration for a [`ParallelExecutor`](crate::exec::ParallelExecutor).
#[derive(Clone)]
pub struct ExecutorOptions {
    /// Upper bound on concurrently running tasks per wave (at least 1).
    pub max_parallel: usize,
    /// Runs each task. Without one every runnable task fails.
    pub task_runner: Option<Arc<dyn TaskRunner>>,
    /// Creates per-task workspaces. `None` disables isolation.
    pub isolation: Option<Arc<dyn IsolationManager>>,
    /// Parent directory of per-task workspaces; a task's workspace is
    /// `worktree_root/<task id>`.
    pub worktree_root: PathBuf,
    pub progress: Option<ProgressCallback>,
    /// Merge and clean up each wave's workspaces before starting the next.
    pub auto_merge: bool,
}

impl ExecutorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_task_runner(mut self, runner: Arc<dyn TaskRunner>) -> Self {
        self.task_runner = Some(runner);
        self
    }

    pub fn with_isolation(mut self, manager: Arc<dyn IsolationManager>) -> Self {
        self.isolation = Some(manager);
        self
    }

    pub fn with_worktree_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.worktree_root = root.into();
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, &str, NodeStatus, &str) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn with_auto_merge(mut self, auto_merge: bool) -> Self {
        self.auto_merge = auto_merge;
        self
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            task_runner: None,
            isolation: None,
            worktree_root: PathBuf::from(DEFAULT_WORKTREE_ROOT),
            progress: None,
            auto_merge: false,
        }
    }
}

impl fmt::Debug for ExecutorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("max_parallel", &self.max_parallel)
            .field("task_runner", &self.task_runner.is_some())
            .field("isolation", &self.isolation.is_some())
            .field("worktree_root", &self.worktree_root)
            .field("progress", &self.progress.is_some())
            .field("auto_merge", &self.auto_merge)
            .finish()
    }
}
