use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use wavedag::isolation::{IsolationManager, Worktree, WorktreeStatus};
use wavedag::types::BoxFuture;

/// In-memory isolation manager with failure injection.
///
/// Records merge and removal order and the highest number of merges that
/// overlapped in time.
#[derive(Default)]
pub struct FakeWorktreeManager {
    worktrees: Mutex<BTreeMap<String, Worktree>>,
    fail_create: HashSet<String>,
    fail_merge: HashSet<String>,
    fail_remove: HashSet<String>,
    merge_delay: Duration,
    merged: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    merges_in_flight: AtomicUsize,
    max_merges_in_flight: AtomicUsize,
}

impl FakeWorktreeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(mut self, name: &str) -> Self {
        self.fail_create.insert(name.to_string());
        self
    }

    pub fn fail_merge(mut self, name: &str) -> Self {
        self.fail_merge.insert(name.to_string());
        self
    }

    pub fn fail_remove(mut self, name: &str) -> Self {
        self.fail_remove.insert(name.to_string());
        self
    }

    pub fn with_merge_delay(mut self, delay: Duration) -> Self {
        self.merge_delay = delay;
        self
    }

    /// Names in the order their merges succeeded.
    pub fn merged(&self) -> Vec<String> {
        self.merged.lock().unwrap().clone()
    }

    /// Names in the order they were removed.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn status_of(&self, name: &str) -> Option<WorktreeStatus> {
        self.worktrees.lock().unwrap().get(name).map(|w| w.status)
    }

    pub fn max_concurrent_merges(&self) -> usize {
        self.max_merges_in_flight.load(Ordering::SeqCst)
    }

    async fn create_inner(&self, name: &str, branch: &str, path: &Path) -> Result<Worktree> {
        if self.fail_create.contains(name) {
            bail!("scripted create failure for '{name}'");
        }
        let wt = Worktree {
            name: name.to_string(),
            branch: branch.to_string(),
            path: path.to_path_buf(),
            status: WorktreeStatus::Active,
        };
        self.worktrees
            .lock()
            .unwrap()
            .insert(name.to_string(), wt.clone());
        Ok(wt)
    }

    async fn merge(&self, name: &str) -> Result<()> {
        let now = self.merges_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_merges_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.merge_delay).await;
        self.merges_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_merge.contains(name) {
            bail!("scripted merge conflict for '{name}'");
        }
        self.merged.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn update_status_inner(&self, name: &str, status: WorktreeStatus) -> Result<()> {
        if !self.worktrees.lock().unwrap().contains_key(name) {
            bail!("unknown worktree '{name}'");
        }
        if status == WorktreeStatus::Merged {
            self.merge(name).await?;
        }
        if let Some(wt) = self.worktrees.lock().unwrap().get_mut(name) {
            wt.status = status;
        }
        Ok(())
    }

    async fn remove_inner(&self, name: &str) -> Result<()> {
        if self.fail_remove.contains(name) {
            return Err(anyhow!("scripted remove failure for '{name}'"));
        }
        let mut map = self.worktrees.lock().unwrap();
        let wt = map
            .get_mut(name)
            .ok_or_else(|| anyhow!("unknown worktree '{name}'"))?;
        wt.status = WorktreeStatus::Removed;
        drop(map);
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

impl IsolationManager for FakeWorktreeManager {
    fn create<'a>(
        &'a self,
        name: &'a str,
        branch: &'a str,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<Worktree>> {
        Box::pin(self.create_inner(name, branch, path))
    }

    fn remove<'a>(&'a self, name: &'a str, _force: bool) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.remove_inner(name))
    }

    fn update_status<'a>(
        &'a self,
        name: &'a str,
        status: WorktreeStatus,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.update_status_inner(name, status))
    }

    fn list(&self) -> Vec<Worktree> {
        self.worktrees.lock().unwrap().values().cloned().collect()
    }
}
