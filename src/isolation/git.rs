// src/isolation/git.rs

//! `git worktree` backed isolation manager.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow, bail};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::isolation::{IsolationManager, Worktree, WorktreeStatus};
use crate::types::BoxFuture;

/// Creates one git worktree per task, on a branch named after the task.
///
/// Promotion to [`WorktreeStatus::Merged`] runs `git merge --no-edit
/// <branch>` in the main checkout. A failed merge is left in place for
/// manual resolution and the workspace stays `Active`.
#[derive(Debug)]
pub struct GitWorktreeManager {
    repo_root: PathBuf,
    worktrees: Mutex<BTreeMap<String, Worktree>>,
}

impl GitWorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            worktrees: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Worktree>> {
        self.worktrees.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, name: &str) -> Result<Worktree> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown worktree '{name}'"))
    }

    fn set_status(&self, name: &str, status: WorktreeStatus) {
        if let Some(wt) = self.lock().get_mut(name) {
            wt.status = status;
        }
    }

    async fn create_inner(&self, name: &str, branch: &str, path: &Path) -> Result<Worktree> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        };

        if checked_out_branch(&path).await.as_deref() == Some(branch) {
            // Kept from an earlier run; pick it up as is.
            info!(worktree = %name, branch = %branch, path = ?path, "reusing existing git worktree");
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating dir {:?}", parent))?;
            }

            let path_arg = path.to_string_lossy().into_owned();
            if self.branch_exists(branch).await {
                run_git(&self.repo_root, &["worktree", "add", &path_arg, branch]).await?;
            } else {
                run_git(&self.repo_root, &["worktree", "add", "-b", branch, &path_arg]).await?;
            }
            info!(worktree = %name, branch = %branch, path = ?path, "created git worktree");
        }

        let wt = Worktree {
            name: name.to_string(),
            branch: branch.to_string(),
            path,
            status: WorktreeStatus::Active,
        };
        self.lock().insert(name.to_string(), wt.clone());
        Ok(wt)
    }

    /// Removes the worktree. A merged worktree's branch is deleted too, so
    /// the same task can be run again later.
    async fn remove_inner(&self, name: &str, force: bool) -> Result<()> {
        let wt = self.lookup(name)?;
        let path_arg = wt.path.to_string_lossy().into_owned();

        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_arg);
        run_git(&self.repo_root, &args).await?;

        if wt.status == WorktreeStatus::Merged {
            run_git(&self.repo_root, &["branch", "-D", &wt.branch])
                .await
                .with_context(|| format!("deleting merged branch '{}'", wt.branch))?;
            debug!(worktree = %name, branch = %wt.branch, "deleted merged branch");
        }

        self.set_status(name, WorktreeStatus::Removed);
        info!(worktree = %name, "removed git worktree");
        Ok(())
    }

    async fn branch_exists(&self, branch: &str) -> bool {
        let refname = format!("refs/heads/{branch}");
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &refname])
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn update_status_inner(&self, name: &str, status: WorktreeStatus) -> Result<()> {
        let wt = self.lookup(name)?;

        if status == WorktreeStatus::Merged && wt.status != WorktreeStatus::Merged {
            run_git(&self.repo_root, &["merge", "--no-edit", &wt.branch])
                .await
                .with_context(|| {
                    format!(
                        "merging branch '{}' into {:?}; resolve manually and retry",
                        wt.branch, self.repo_root
                    )
                })?;
            info!(worktree = %name, branch = %wt.branch, "merged worktree branch");
        }

        self.set_status(name, status);
        Ok(())
    }
}

impl IsolationManager for GitWorktreeManager {
    fn create<'a>(
        &'a self,
        name: &'a str,
        branch: &'a str,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<Worktree>> {
        Box::pin(self.create_inner(name, branch, path))
    }

    fn remove<'a>(&'a self, name: &'a str, force: bool) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.remove_inner(name, force))
    }

    fn update_status<'a>(
        &'a self,
        name: &'a str,
        status: WorktreeStatus,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.update_status_inner(name, status))
    }

    fn list(&self) -> Vec<Worktree> {
        self.lock().values().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<Worktree> {
        self.lock().get(name).cloned()
    }
}

/// Branch checked out in the worktree at `path`, if `path` is one.
async fn checked_out_branch(path: &Path) -> Option<String> {
    if !path.join(".git").exists() {
        return None;
    }
    run_git(path, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .ok()
        .map(|out| out.trim().to_string())
}

/// Run `git <args>` in `dir`, returning stdout. Non-zero exit is an error
/// carrying git's stderr.
async fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    debug!(?dir, ?args, "running git");

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("spawning git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(?args, code = output.status.code(), "git command failed");
        bail!(
            "git {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn init_repo(dir: &Path) -> Result<()> {
        run_git(dir, &["init", "-q"]).await?;
        run_git(
            dir,
            &[
                "-c",
                "user.name=wavedag",
                "-c",
                "user.email=wavedag@example.invalid",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                "init",
            ],
        )
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn unknown_worktree_operations_fail() {
        let mgr = GitWorktreeManager::new("/nonexistent");
        assert!(mgr.remove("nope", true).await.is_err());
        assert!(mgr.update_status("nope", WorktreeStatus::Merged).await.is_err());
        assert!(mgr.list().is_empty());
        assert!(mgr.get("nope").is_none());
    }

    #[tokio::test]
    async fn worktree_lifecycle_against_real_repo() -> Result<()> {
        if !git_available().await {
            eprintln!("git not available; skipping");
            return Ok(());
        }

        let repo = tempfile::tempdir()?;
        init_repo(repo.path()).await?;

        let mgr = GitWorktreeManager::new(repo.path());
        let wt = mgr
            .create("task-a", "task-a", Path::new(".wavedag/worktrees/task-a"))
            .await?;

        assert_eq!(wt.status, WorktreeStatus::Active);
        assert!(wt.path.is_absolute());
        assert!(wt.path.exists());
        assert_eq!(mgr.list().len(), 1);

        // Branch has no new commits, so the merge is a no-op that succeeds.
        mgr.update_status("task-a", WorktreeStatus::Merged).await?;
        assert_eq!(mgr.get("task-a").map(|w| w.status), Some(WorktreeStatus::Merged));

        mgr.remove("task-a", true).await?;
        assert_eq!(mgr.get("task-a").map(|w| w.status), Some(WorktreeStatus::Removed));
        assert!(!wt.path.exists());
        assert!(!mgr.branch_exists("task-a").await);

        Ok(())
    }

    #[tokio::test]
    async fn same_task_can_be_created_again_after_merge_and_remove() -> Result<()> {
        if !git_available().await {
            eprintln!("git not available; skipping");
            return Ok(());
        }

        let repo = tempfile::tempdir()?;
        init_repo(repo.path()).await?;
        let path = Path::new(".wavedag/worktrees/A");

        let first = GitWorktreeManager::new(repo.path());
        first.create("A", "A", path).await?;
        first.update_status("A", WorktreeStatus::Merged).await?;
        first.remove("A", true).await?;

        let second = GitWorktreeManager::new(repo.path());
        let wt = second.create("A", "A", path).await?;
        assert_eq!(wt.status, WorktreeStatus::Active);
        assert!(wt.path.exists());

        Ok(())
    }

    #[tokio::test]
    async fn unmerged_branch_is_reused_after_remove() -> Result<()> {
        if !git_available().await {
            eprintln!("git not available; skipping");
            return Ok(());
        }

        let repo = tempfile::tempdir()?;
        init_repo(repo.path()).await?;
        let path = Path::new(".wavedag/worktrees/B");

        let first = GitWorktreeManager::new(repo.path());
        first.create("B", "B", path).await?;
        first.remove("B", true).await?;
        assert!(first.branch_exists("B").await);

        let second = GitWorktreeManager::new(repo.path());
        let wt = second.create("B", "B", path).await?;
        assert_eq!(checked_out_branch(&wt.path).await.as_deref(), Some("B"));

        Ok(())
    }

    #[tokio::test]
    async fn worktree_kept_for_inspection_is_picked_up() -> Result<()> {
        if !git_available().await {
            eprintln!("git not available; skipping");
            return Ok(());
        }

        let repo = tempfile::tempdir()?;
        init_repo(repo.path()).await?;
        let path = Path::new(".wavedag/worktrees/C");

        let first = GitWorktreeManager::new(repo.path());
        let kept = first.create("C", "C", path).await?;

        let second = GitWorktreeManager::new(repo.path());
        let wt = second.create("C", "C", path).await?;
        assert_eq!(wt.path, kept.path);
        assert_eq!(second.get("C").map(|w| w.status), Some(WorktreeStatus::Active));

        Ok(())
    }
}
