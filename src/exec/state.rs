// src/exec/state.rs

//! Bookkeeping shared by the tasks of a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dag::TaskId;
use crate::exec::result::TaskFailure;

#[derive(Debug, Clone)]
struct TrackedWorktree {
    path: PathBuf,
    merged: bool,
}

/// Why a task has to be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SkipCause {
    pub reason: String,
    /// The failed task at the top of the skip chain.
    pub root: TaskId,
}

/// Failures, skips and outstanding isolation workspaces of one executor.
///
/// Accumulates across waves and is never reset. The executor keeps it
/// behind a single mutex; nothing here is async.
#[derive(Debug, Default)]
pub(crate) struct ExecutorState {
    failed: HashMap<TaskId, TaskFailure>,
    skipped: HashMap<TaskId, String>,
    skip_roots: HashMap<TaskId, TaskId>,
    worktrees: HashMap<TaskId, TrackedWorktree>,
}

impl ExecutorState {
    /// If any of `deps` failed or was skipped, the cause for skipping a
    /// dependent. The first offending dependency in declaration order wins.
    ///
    /// A skipped dependency is cited together with the root failure only,
    /// so reasons stay the same size however deep the chain is.
    pub fn skip_cause(&self, deps: &[TaskId]) -> Option<SkipCause> {
        deps.iter().find_map(|dep| {
            if let Some(err) = self.failed.get(dep) {
                Some(SkipCause {
                    reason: format!("dependency '{dep}' failed: {err}"),
                    root: dep.clone(),
                })
            } else {
                self.skip_roots.get(dep).map(|root| SkipCause {
                    reason: format!("dependency '{dep}' was skipped (root failure: '{root}')"),
                    root: root.clone(),
                })
            }
        })
    }

    pub fn record_failure(&mut self, task: &str, failure: TaskFailure) {
        self.failed.insert(task.to_string(), failure);
    }

    pub fn record_skip(&mut self, task: &str, cause: &SkipCause) {
        self.skipped.insert(task.to_string(), cause.reason.clone());
        self.skip_roots.insert(task.to_string(), cause.root.clone());
    }

    pub fn track_worktree(&mut self, task: &str, path: &Path) {
        self.worktrees.insert(
            task.to_string(),
            TrackedWorktree {
                path: path.to_path_buf(),
                merged: false,
            },
        );
    }

    /// `Some(merged)` for a tracked workspace, `None` otherwise.
    pub fn worktree_merged(&self, task: &str) -> Option<bool> {
        self.worktrees.get(task).map(|wt| wt.merged)
    }

    pub fn mark_merged(&mut self, task: &str) {
        if let Some(wt) = self.worktrees.get_mut(task) {
            wt.merged = true;
        }
    }

    pub fn forget_worktree(&mut self, task: &str) {
        self.worktrees.remove(task);
    }

    pub fn failed(&self) -> HashMap<TaskId, TaskFailure> {
        self.failed.clone()
    }

    pub fn skipped(&self) -> HashMap<TaskId, String> {
        self.skipped.clone()
    }

    pub fn worktree_paths(&self) -> HashMap<TaskId, PathBuf> {
        self.worktrees
            .iter()
            .map(|(id, wt)| (id.clone(), wt.path.clone()))
            .collect()
    }
}
