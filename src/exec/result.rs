// src/exec/result.rs

//! Per-task and per-wave result types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::dag::TaskId;

/// Why a task that was allowed to run did not succeed.
///
/// Messages are captured as text so results stay plain, cloneable values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskFailure {
    #[error("no task runner configured")]
    NoRunner,

    #[error("creating isolation workspace failed: {0}")]
    IsolationCreate(String),

    #[error("task runner failed: {0}")]
    Runner(String),

    /// The run was cancelled before the task got to start.
    #[error("cancelled before the task started")]
    Cancelled,
}

/// Outcome of one task in one wave. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelTaskResult {
    pub task_id: TaskId,
    pub success: bool,
    /// Present iff the task ran (or tried to) and did not succeed.
    pub error: Option<TaskFailure>,
    pub duration: Duration,
    /// Isolation workspace path; `None` when isolation is disabled or the
    /// workspace could not be created.
    pub worktree_path: Option<PathBuf>,
    pub skipped: bool,
    /// Names the offending dependency when `skipped` is set.
    pub skip_reason: Option<String>,
}

impl ParallelTaskResult {
    pub fn succeeded(task_id: TaskId, duration: Duration, worktree_path: Option<PathBuf>) -> Self {
        Self {
            task_id,
            success: true,
            error: None,
            duration,
            worktree_path,
            skipped: false,
            skip_reason: None,
        }
    }

    pub fn failed(
        task_id: TaskId,
        error: TaskFailure,
        duration: Duration,
        worktree_path: Option<PathBuf>,
    ) -> Self {
        Self {
            task_id,
            success: false,
            error: Some(error),
            duration,
            worktree_path,
            skipped: false,
            skip_reason: None,
        }
    }

    pub fn skipped(task_id: TaskId, reason: String) -> Self {
        Self {
            task_id,
            success: false,
            error: None,
            duration: Duration::ZERO,
            worktree_path: None,
            skipped: true,
            skip_reason: Some(reason),
        }
    }

    /// Ran and failed (as opposed to skipped).
    pub fn is_failure(&self) -> bool {
        !self.success && !self.skipped
    }
}

/// Wave-level outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveStatus {
    Running,
    /// Every task that ran succeeded. Skips do not count against a wave.
    Completed,
    /// At least one task that ran failed.
    PartiallyFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveResult {
    pub wave: usize,
    /// One result per task, in the wave's task order.
    pub results: Vec<ParallelTaskResult>,
    pub status: WaveStatus,
    pub duration: Duration,
}

impl WaveResult {
    /// Build a finished wave result, deriving its status from `results`.
    pub fn finished(wave: usize, results: Vec<ParallelTaskResult>, duration: Duration) -> Self {
        let status = if results.iter().any(ParallelTaskResult::is_failure) {
            WaveStatus::PartiallyFailed
        } else {
            WaveStatus::Completed
        };
        Self {
            wave,
            results,
            status,
            duration,
        }
    }

    pub fn result_for(&self, task_id: &str) -> Option<&ParallelTaskResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ParallelTaskResult> {
        self.results.iter().filter(|r| r.success && !r.skipped)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ParallelTaskResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ParallelTaskResult> {
        self.results.iter().filter(|r| r.skipped)
    }
}

/// Totals across a run's wave results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub waves: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn from_waves(waves: &[WaveResult]) -> Self {
        waves.iter().fold(
            RunSummary {
                waves: waves.len(),
                ..RunSummary::default()
            },
            |mut acc, wave| {
                acc.succeeded += wave.succeeded().count();
                acc.failed += wave.failed().count();
                acc.skipped += wave.skipped().count();
                acc.elapsed += wave.duration;
                acc
            },
        )
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} wave(s): {} succeeded, {} failed, {} skipped in {:.2?}",
            self.waves, self.succeeded, self.failed, self.skipped, self.elapsed
        )
    }
}
