// src/dag/mod.rs

//! Task graph and wave partitioning.
//!
//! - [`node`] holds the task input type and per-node status.
//! - [`graph`] builds and validates the dependency graph and owns the live
//!   node statuses shared with the executor.
//! - [`waves`] computes the ordered execution waves and their statistics.
//! - [`progress`] renders one-line progress summaries for a wave.

pub mod graph;
pub mod node;
pub mod progress;
pub mod waves;

pub use graph::DependencyGraph;
pub use node::{NodeStatus, TaskId, TaskNode, TaskSpec};
pub use waves::{ExecutionWave, WaveStats};
