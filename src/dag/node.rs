// src/dag/node.rs

//! Task input and node types.

use std::fmt;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Declared unit of work handed to [`DependencyGraph::build`].
///
/// [`DependencyGraph::build`]: crate::dag::DependencyGraph::build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Tasks that must complete before this one may start.
    pub dependencies: Vec<TaskId>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
        }
    }

    /// Add a dependency on `dep`.
    pub fn after(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }
}

/// Live status of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Never started because an upstream task failed or was skipped.
    Skipped,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }

    /// Whether the node has reached a final state for this run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one node, as returned by [`DependencyGraph::get_node`].
///
/// [`DependencyGraph::get_node`]: crate::dag::DependencyGraph::get_node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    pub id: TaskId,
    pub dependencies: Vec<TaskId>,
    pub status: NodeStatus,
}
