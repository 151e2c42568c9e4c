// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::dag::node::{NodeStatus, TaskId, TaskNode, TaskSpec};
use crate::dag::waves::{self, ExecutionWave, WaveStats};
use crate::errors::{Result, WavedagError};

/// Dependency graph over a fixed task list.
///
/// Structure (ids, dependencies, dependents) is immutable after
/// [`build`](Self::build). Node statuses live behind their own lock so that
/// concurrently running tasks can update them through `&self`.
///
/// The wave partition is computed once by [`compute_waves`](Self::compute_waves)
/// and never recomputed.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Task ids in the order they were supplied.
    ids: Vec<TaskId>,
    index: HashMap<TaskId, usize>,
    /// Direct dependencies per node, de-duplicated, declaration order.
    deps: Vec<Vec<TaskId>>,
    /// Direct dependents per node.
    dependents: Vec<Vec<TaskId>>,
    statuses: RwLock<Vec<NodeStatus>>,
    waves: Option<Vec<ExecutionWave>>,
    /// 1-indexed wave number per node, filled by `compute_waves`.
    wave_of: Vec<usize>,
}

impl DependencyGraph {
    /// Build a graph from a task list.
    ///
    /// Rejects duplicate ids, dependencies on unknown ids and tasks that
    /// depend on themselves. Cycles spanning several tasks are reported by
    /// [`compute_waves`](Self::compute_waves).
    pub fn build<I>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskSpec>,
    {
        let specs: Vec<TaskSpec> = tasks.into_iter().collect();

        let mut ids = Vec::with_capacity(specs.len());
        let mut index = HashMap::with_capacity(specs.len());

        for spec in specs.iter() {
            if index.insert(spec.id.clone(), ids.len()).is_some() {
                return Err(WavedagError::DuplicateTask(spec.id.clone()));
            }
            ids.push(spec.id.clone());
        }

        let mut deps = Vec::with_capacity(specs.len());
        let mut dependents: Vec<Vec<TaskId>> = vec![Vec::new(); specs.len()];

        for spec in specs {
            let mut seen = HashSet::new();
            let mut node_deps = Vec::with_capacity(spec.dependencies.len());

            for dep in spec.dependencies {
                if dep == spec.id {
                    return Err(WavedagError::SelfDependency(spec.id));
                }
                let Some(&dep_idx) = index.get(&dep) else {
                    return Err(WavedagError::UnknownDependency {
                        task: spec.id,
                        dependency: dep,
                    });
                };
                if seen.insert(dep.clone()) {
                    dependents[dep_idx].push(spec.id.clone());
                    node_deps.push(dep);
                }
            }

            deps.push(node_deps);
        }

        debug!(tasks = ids.len(), "dependency graph built");

        let statuses = RwLock::new(vec![NodeStatus::Pending; ids.len()]);

        Ok(Self {
            ids,
            index,
            deps,
            dependents,
            statuses,
            waves: None,
            wave_of: Vec::new(),
        })
    }

    /// Partition the nodes into ordered execution waves.
    ///
    /// A node's wave is `1 + max(wave of its dependencies)`; roots are in
    /// wave 1. Calling this again after a successful call returns the same
    /// partition.
    pub fn compute_waves(&mut self) -> Result<Vec<ExecutionWave>> {
        if let Some(waves) = &self.waves {
            return Ok(waves.clone());
        }

        let wave_of = waves::assign_wave_numbers(&self.ids, &self.index, &self.deps)?;
        let waves = waves::group_into_waves(&self.ids, &wave_of);

        info!(
            waves = waves.len(),
            tasks = self.ids.len(),
            "computed execution waves"
        );

        self.wave_of = wave_of;
        self.waves = Some(waves.clone());
        Ok(waves)
    }

    /// The previously computed partition.
    ///
    /// Returns [`WavedagError::WavesNotComputed`] before `compute_waves`.
    pub fn waves(&self) -> Result<&[ExecutionWave]> {
        self.waves.as_deref().ok_or(WavedagError::WavesNotComputed)
    }

    /// Wave statistics from the computed partition (all zero if the
    /// partition has not been computed yet).
    pub fn get_wave_stats(&self) -> WaveStats {
        WaveStats::from_waves(self.waves.as_deref().unwrap_or(&[]))
    }

    /// 1-indexed wave number for a task, or `None` if the task is unknown
    /// or waves have not been computed.
    pub fn get_wave_for_task(&self, id: &str) -> Option<usize> {
        let idx = *self.index.get(id)?;
        self.wave_of.get(idx).copied()
    }

    /// Snapshot of a node, or `None` for an unknown id.
    pub fn get_node(&self, id: &str) -> Option<TaskNode> {
        let idx = *self.index.get(id)?;
        Some(TaskNode {
            id: self.ids[idx].clone(),
            dependencies: self.deps[idx].clone(),
            status: self.read_statuses()[idx],
        })
    }

    /// Current status of a node, or `None` for an unknown id.
    pub fn node_status(&self, id: &str) -> Option<NodeStatus> {
        let idx = *self.index.get(id)?;
        Some(self.read_statuses()[idx])
    }

    /// Update a node's status.
    ///
    /// Safe to call from several tasks at once. Unknown ids are an error
    /// ([`WavedagError::TaskNotFound`]) and leave every status unchanged.
    pub fn set_node_status(&self, id: &str, status: NodeStatus) -> Result<()> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| WavedagError::TaskNotFound(id.to_string()))?;
        self.write_statuses()[idx] = status;
        Ok(())
    }

    /// All task ids, in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.index
            .get(id)
            .map(|&idx| self.deps[idx].as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.index
            .get(id)
            .map(|&idx| self.dependents[idx].as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn read_statuses(&self) -> RwLockReadGuard<'_, Vec<NodeStatus>> {
        self.statuses.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_statuses(&self) -> RwLockWriteGuard<'_, Vec<NodeStatus>> {
        self.statuses.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }
}
