// src/dag/progress.rs

//! One-line progress summaries for a wave.

use std::fmt::Write as _;

use crate::dag::graph::DependencyGraph;
use crate::dag::node::NodeStatus;

impl DependencyGraph {
    /// Render the latest node statuses of a wave, e.g.
    ///
    /// ```text
    /// wave 1/2 [2/3 done: 1 completed, 1 failed, 0 skipped, 1 running, 0 pending] A=completed B=failed C=running
    /// ```
    ///
    /// Unknown wave numbers (or a partition that was never computed) render
    /// as a short notice instead of panicking.
    pub fn render_progress(&self, wave_number: usize) -> String {
        let Ok(waves) = self.waves() else {
            return format!("wave {wave_number}: waves not computed");
        };
        let Some(wave) = wave_number
            .checked_sub(1)
            .and_then(|idx| waves.get(idx))
        else {
            return format!("wave {wave_number}/{}: no such wave", waves.len());
        };

        let statuses = self.read_statuses();
        let per_task: Vec<(&str, NodeStatus)> = wave
            .tasks
            .iter()
            .filter_map(|id| {
                self.index_of(id)
                    .map(|idx| (id.as_str(), statuses[idx]))
            })
            .collect();
        drop(statuses);

        let count = |s: NodeStatus| per_task.iter().filter(|(_, st)| *st == s).count();
        let done = per_task.iter().filter(|(_, st)| st.is_terminal()).count();

        let mut line = format!(
            "wave {}/{} [{}/{} done: {} completed, {} failed, {} skipped, {} running, {} pending]",
            wave.number,
            waves.len(),
            done,
            per_task.len(),
            count(NodeStatus::Completed),
            count(NodeStatus::Failed),
            count(NodeStatus::Skipped),
            count(NodeStatus::Running),
            count(NodeStatus::Pending),
        );
        for (id, status) in per_task {
            let _ = write!(line, " {id}={status}");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use crate::dag::{DependencyGraph, NodeStatus, TaskSpec};

    fn graph() -> DependencyGraph {
        let mut graph = DependencyGraph::build(vec![
            TaskSpec::new("A"),
            TaskSpec::new("B"),
            TaskSpec::new("C").after("A"),
        ])
        .unwrap();
        graph.compute_waves().unwrap();
        graph
    }

    #[test]
    fn reflects_latest_statuses() {
        let graph = graph();
        graph.set_node_status("A", NodeStatus::Completed).unwrap();
        graph.set_node_status("B", NodeStatus::Running).unwrap();

        let line = graph.render_progress(1);
        assert!(line.starts_with("wave 1/2 [1/2 done"), "{line}");
        assert!(line.contains("A=completed"));
        assert!(line.contains("B=running"));
        assert!(!line.contains("C="));

        graph.set_node_status("B", NodeStatus::Failed).unwrap();
        let line = graph.render_progress(1);
        assert!(line.contains("[2/2 done: 1 completed, 1 failed"), "{line}");
    }

    #[test]
    fn out_of_range_waves_do_not_panic() {
        let graph = graph();
        assert_eq!(graph.render_progress(0), "wave 0/2: no such wave");
        assert_eq!(graph.render_progress(9), "wave 9/2: no such wave");
    }

    #[test]
    fn uncomputed_partition_renders_notice() {
        let graph = DependencyGraph::build(vec![TaskSpec::new("A")]).unwrap();
        assert_eq!(graph.render_progress(1), "wave 1: waves not computed");
    }
}
