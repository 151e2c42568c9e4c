// src/isolation/mod.rs

//! Per-task filesystem isolation.
//!
//! The executor only sequences calls against an [`IsolationManager`]; how a
//! workspace is checked out, merged or removed is up to the implementation.
//!
//! - [`git`] provides [`GitWorktreeManager`], backed by `git worktree`.
//! - Tests provide their own in-memory implementations.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::types::BoxFuture;

pub mod git;

pub use git::GitWorktreeManager;

/// Lifecycle state of an isolation workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorktreeStatus {
    Active,
    Merged,
    Removed,
}

impl fmt::Display for WorktreeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorktreeStatus::Active => "active",
            WorktreeStatus::Merged => "merged",
            WorktreeStatus::Removed => "removed",
        })
    }
}

/// A named, independently checked-out working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub name: String,
    pub branch: String,
    pub path: PathBuf,
    pub status: WorktreeStatus,
}

/// Capability to create, promote and remove isolation workspaces.
///
/// Implementations must be shareable across concurrently running tasks.
pub trait IsolationManager: Send + Sync {
    /// Create a workspace called `name` on a new branch `branch` at `path`.
    fn create<'a>(
        &'a self,
        name: &'a str,
        branch: &'a str,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<Worktree>>;

    /// Remove the workspace called `name`. `force` discards local changes.
    fn remove<'a>(&'a self, name: &'a str, force: bool) -> BoxFuture<'a, Result<()>>;

    /// Move the workspace called `name` to `status`.
    ///
    /// Moving to [`WorktreeStatus::Merged`] is where an implementation
    /// integrates the workspace's content into the shared target.
    fn update_status<'a>(
        &'a self,
        name: &'a str,
        status: WorktreeStatus,
    ) -> BoxFuture<'a, Result<()>>;

    /// All known workspaces. Used by reporting layers, not by the executor.
    fn list(&self) -> Vec<Worktree>;

    /// Look up one workspace by name.
    fn get(&self, name: &str) -> Option<Worktree> {
        self.list().into_iter().find(|wt| wt.name == name)
    }
}
