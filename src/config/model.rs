// src/config/model.rs

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Deserialize;

use crate::dag::{DependencyGraph, TaskId, TaskSpec};
use crate::errors::Result;
use crate::exec::DEFAULT_MAX_PARALLEL;
use crate::exec::options::DEFAULT_WORKTREE_ROOT;
use crate::types::{IsolationMode, RunContext};

/// Plan file exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [executor]
/// max_parallel = 4
/// isolation = "git"
/// auto_merge = true
/// target = "feature-x"
///
/// [vars]
/// PROFILE = "release"
///
/// [task.A]
/// cmd = "make a"
///
/// [task.B]
/// cmd = "make b"
/// after = ["A"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPlanFile {
    #[serde(default)]
    pub executor: ExecutorSection,

    /// Extra variables exported to every task.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// All tasks from `[task.<id>]`.
    #[serde(default)]
    pub task: BTreeMap<TaskId, TaskConfig>,
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// Maximum number of tasks running at once within a wave.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default)]
    pub isolation: IsolationMode,

    /// Where per-task worktrees are created, relative to the plan file's
    /// directory unless absolute.
    #[serde(default = "default_worktree_root")]
    pub worktree_root: String,

    /// Merge and remove each wave's worktrees before the next wave starts.
    #[serde(default)]
    pub auto_merge: bool,

    /// Target name passed to every task as run context.
    #[serde(default)]
    pub target: Option<String>,
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

fn default_worktree_root() -> String {
    DEFAULT_WORKTREE_ROOT.to_string()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            isolation: IsolationMode::default(),
            worktree_root: default_worktree_root(),
            auto_merge: false,
            target: None,
        }
    }
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command that performs the task.
    pub cmd: String,

    /// Tasks that must complete first (`after = ["A", "B"]`).
    #[serde(default)]
    pub after: Vec<TaskId>,
}

/// A validated plan file.
///
/// Only obtainable through `TryFrom<RawPlanFile>`, which guarantees that the
/// task graph builds and partitions without error.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub executor: ExecutorSection,
    pub vars: BTreeMap<String, String>,
    pub task: BTreeMap<TaskId, TaskConfig>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(
        executor: ExecutorSection,
        vars: BTreeMap<String, String>,
        task: BTreeMap<TaskId, TaskConfig>,
    ) -> Self {
        Self {
            executor,
            vars,
            task,
        }
    }

    /// Task list in graph-input form.
    pub fn task_specs(&self) -> Vec<TaskSpec> {
        task_specs(&self.task)
    }

    /// Build the dependency graph and compute its waves.
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::build(self.task_specs())?;
        graph.compute_waves()?;
        Ok(graph)
    }

    /// Task id → shell command, for [`ShellTaskRunner`](crate::exec::ShellTaskRunner).
    pub fn commands(&self) -> HashMap<TaskId, String> {
        self.task
            .iter()
            .map(|(id, t)| (id.clone(), t.cmd.clone()))
            .collect()
    }

    pub fn run_context(&self) -> RunContext {
        RunContext {
            target: self.executor.target.clone(),
            vars: self.vars.clone(),
        }
    }

    pub fn worktree_root(&self) -> PathBuf {
        PathBuf::from(&self.executor.worktree_root)
    }
}

pub(crate) fn task_specs(tasks: &BTreeMap<TaskId, TaskConfig>) -> Vec<TaskSpec> {
    tasks
        .iter()
        .map(|(id, t)| TaskSpec::new(id.clone()).with_dependencies(t.after.iter().cloned()))
        .collect()
}
