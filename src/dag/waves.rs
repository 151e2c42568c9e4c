// src/dag/waves.rs

//! Wave partitioning.
//!
//! The graph is checked for cycles with a topological sort; wave numbers are
//! then assigned in topological order so each node sees its dependencies'
//! final numbers.

use std::collections::HashMap;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dag::node::TaskId;
use crate::errors::{Result, WavedagError};

/// Tasks eligible to run together. Wave numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionWave {
    pub number: usize,
    pub tasks: Vec<TaskId>,
}

impl ExecutionWave {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Aggregate shape of a wave partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveStats {
    pub total_waves: usize,
    pub total_tasks: usize,
    pub max_wave_size: usize,
    pub min_wave_size: usize,
}

impl WaveStats {
    pub fn from_waves(waves: &[ExecutionWave]) -> Self {
        Self {
            total_waves: waves.len(),
            total_tasks: waves.iter().map(ExecutionWave::len).sum(),
            max_wave_size: waves.iter().map(ExecutionWave::len).max().unwrap_or(0),
            min_wave_size: waves.iter().map(ExecutionWave::len).min().unwrap_or(0),
        }
    }
}

/// Compute the 1-indexed wave number of every node.
///
/// `ids[i]` is node `i`; `deps[i]` lists its direct dependencies by id.
pub(crate) fn assign_wave_numbers(
    ids: &[TaskId],
    index: &HashMap<TaskId, usize>,
    deps: &[Vec<TaskId>],
) -> Result<Vec<usize>> {
    // Edge direction: dep -> task.
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(ids.len(), 0);
    for i in 0..ids.len() {
        graph.add_node(i);
    }
    for (task_idx, node_deps) in deps.iter().enumerate() {
        for dep in node_deps {
            if let Some(&dep_idx) = index.get(dep) {
                graph.add_edge(NodeIndex::new(dep_idx), NodeIndex::new(task_idx), ());
            }
        }
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(cycle) => return Err(cycle_error(&graph, ids, cycle.node_id())),
    };

    let mut wave_of = vec![0usize; ids.len()];
    for node in order {
        let idx = node.index();
        let deepest = deps[idx]
            .iter()
            .filter_map(|dep| index.get(dep))
            .map(|&dep_idx| wave_of[dep_idx])
            .max()
            .unwrap_or(0);
        wave_of[idx] = deepest + 1;
    }

    Ok(wave_of)
}

/// Group node ids by wave number, keeping declaration order inside a wave.
pub(crate) fn group_into_waves(ids: &[TaskId], wave_of: &[usize]) -> Vec<ExecutionWave> {
    let total = wave_of.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<ExecutionWave> = (1..=total)
        .map(|number| ExecutionWave {
            number,
            tasks: Vec::new(),
        })
        .collect();

    for (idx, id) in ids.iter().enumerate() {
        waves[wave_of[idx] - 1].tasks.push(id.clone());
    }

    waves
}

fn cycle_error(graph: &DiGraph<usize, ()>, ids: &[TaskId], at: NodeIndex) -> WavedagError {
    // Report every member of the strongly connected component that holds
    // the node toposort tripped on.
    let cyclic: Vec<Vec<NodeIndex>> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .collect();
    let scc = cyclic
        .iter()
        .find(|scc| scc.contains(&at))
        .or_else(|| cyclic.first());

    let mut members: Vec<usize> = scc
        .map(|scc| scc.iter().map(|n| n.index()).collect())
        .unwrap_or_else(|| vec![at.index()]);
    members.sort_unstable();

    let names: Vec<&str> = members.iter().map(|&i| ids[i].as_str()).collect();

    WavedagError::DagCycle(format!(
        "cycle detected in task DAG involving task '{}' (cycle members: {})",
        names[0],
        names.join(", ")
    ))
}
