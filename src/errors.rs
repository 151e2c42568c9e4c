// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::dag::TaskId;

#[derive(Error, Debug)]
pub enum WavedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("execution waves have not been computed")]
    WavesNotComputed,

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("run cancelled")]
    Cancelled,

    #[error("task '{task}' did not run to completion: {message}")]
    TaskJoin { task: TaskId, message: String },

    #[error("merging worktree for task '{task}' failed")]
    Merge {
        task: TaskId,
        #[source]
        source: anyhow::Error,
    },

    #[error("removing worktree for task '{task}' failed")]
    Cleanup {
        task: TaskId,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WavedagError {
    /// True for the error raised when the run's cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WavedagError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WavedagError>;
