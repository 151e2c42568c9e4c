#![allow(dead_code)]

use std::sync::Arc;

use wavedag::dag::{DependencyGraph, TaskSpec};

/// Builder for task lists and ready-to-execute graphs.
pub struct TaskListBuilder {
    tasks: Vec<TaskSpec>,
}

impl TaskListBuilder {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Add task `id` depending on `after`.
    pub fn task(mut self, id: &str, after: &[&str]) -> Self {
        self.tasks
            .push(TaskSpec::new(id).with_dependencies(after.iter().copied()));
        self
    }

    /// Add `n` independent tasks named `{prefix}{i}`.
    pub fn independent(mut self, prefix: &str, n: usize) -> Self {
        for i in 0..n {
            self.tasks.push(TaskSpec::new(format!("{prefix}{i}")));
        }
        self
    }

    pub fn specs(self) -> Vec<TaskSpec> {
        self.tasks
    }

    /// Build the graph and compute its waves.
    pub fn build_graph(self) -> Arc<DependencyGraph> {
        let mut graph =
            DependencyGraph::build(self.tasks).expect("Failed to build graph from builder");
        graph
            .compute_waves()
            .expect("Failed to compute waves from builder");
        Arc::new(graph)
    }
}

impl Default for TaskListBuilder {
    fn default() -> Self {
        Self::new()
    }
}
