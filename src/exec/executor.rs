// src/exec/executor.rs

//! Wave-by-wave parallel executor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::dag::{DependencyGraph, ExecutionWave, NodeStatus, TaskId, WaveStats};
use crate::errors::{Result, WavedagError};
use crate::exec::options::{ExecutorOptions, ProgressCallback};
use crate::exec::result::{ParallelTaskResult, TaskFailure, WaveResult};
use crate::exec::runner::{TaskInvocation, TaskRunner};
use crate::exec::state::ExecutorState;
use crate::isolation::{IsolationManager, WorktreeStatus};
use crate::types::RunContext;

/// A run that stopped before every wave was executed.
///
/// Carries every wave result produced before the stop, so partial progress
/// stays visible.
#[derive(Debug, Error)]
#[error("run aborted after {} wave(s)", .completed.len())]
pub struct AbortedRun {
    pub completed: Vec<WaveResult>,
    #[source]
    pub source: WavedagError,
}

impl AbortedRun {
    fn new(completed: Vec<WaveResult>, source: WavedagError) -> Self {
        Self { completed, source }
    }

    /// True when the run stopped because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

/// Runs the waves of a [`DependencyGraph`] in order, the tasks of each wave
/// concurrently.
///
/// A failed task never affects its siblings; instead every task that
/// depends on it (directly or through skipped tasks) is skipped in later
/// waves without being run. Failure/skip bookkeeping accumulates for the
/// lifetime of the executor, so use one executor per run.
pub struct ParallelExecutor {
    graph: Arc<DependencyGraph>,
    options: ExecutorOptions,
    state: Arc<Mutex<ExecutorState>>,
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("tasks", &self.graph.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ParallelExecutor {
    pub fn new(graph: Arc<DependencyGraph>, options: ExecutorOptions) -> Self {
        Self {
            graph,
            options,
            state: Arc::new(Mutex::new(ExecutorState::default())),
        }
    }

    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// The wave partition that [`execute_waves`](Self::execute_waves) would
    /// follow, without running anything.
    pub fn dry_run(&self) -> Result<Vec<ExecutionWave>> {
        Ok(self.graph.waves()?.to_vec())
    }

    pub fn get_wave_stats(&self) -> WaveStats {
        self.graph.get_wave_stats()
    }

    /// Copy of the failed-task map.
    pub fn failed_tasks(&self) -> HashMap<TaskId, TaskFailure> {
        self.lock_state().failed()
    }

    /// Copy of the skipped-task map (task → reason).
    pub fn skipped_tasks(&self) -> HashMap<TaskId, String> {
        self.lock_state().skipped()
    }

    /// Copy of the workspaces still awaiting merge or cleanup.
    pub fn pending_worktrees(&self) -> HashMap<TaskId, PathBuf> {
        self.lock_state().worktree_paths()
    }

    /// Execute every wave in order.
    ///
    /// Stops before starting a wave once `cancel` has fired. Per-task
    /// failures never end the run; they show up in the returned
    /// [`WaveResult`]s. Infrastructure problems (no computed partition, a
    /// task future that panicked, a failed merge with `auto_merge`) end the
    /// run with an [`AbortedRun`] carrying the results so far.
    pub async fn execute_waves(
        &self,
        cancel: &CancellationToken,
        run_context: &RunContext,
    ) -> std::result::Result<Vec<WaveResult>, AbortedRun> {
        let waves = self
            .graph
            .waves()
            .map_err(|e| AbortedRun::new(Vec::new(), e))?
            .to_vec();

        info!(
            waves = waves.len(),
            tasks = self.graph.len(),
            max_parallel = self.options.max_parallel,
            isolation = self.options.isolation.is_some(),
            "starting wave execution"
        );

        let run_context = Arc::new(run_context.clone());
        let mut results: Vec<WaveResult> = Vec::with_capacity(waves.len());

        for wave in &waves {
            if cancel.is_cancelled() {
                warn!(
                    wave = wave.number,
                    completed = results.len(),
                    "run cancelled; not starting further waves"
                );
                return Err(AbortedRun::new(results, WavedagError::Cancelled));
            }

            match self.execute_wave(wave, cancel, &run_context).await {
                Ok(wave_result) => results.push(wave_result),
                Err((partial, err)) => {
                    error!(wave = wave.number, error = %err, "wave aborted");
                    results.push(partial);
                    return Err(AbortedRun::new(results, err));
                }
            }

            if self.options.auto_merge {
                if let Some(done) = results.last() {
                    if let Err(err) = self.merge_wave_worktrees(done).await {
                        error!(wave = wave.number, error = %err, "auto-merge failed; stopping run");
                        return Err(AbortedRun::new(results, err));
                    }
                    if let Err(err) = self.cleanup_wave_worktrees(done).await {
                        warn!(wave = wave.number, error = %err, "auto-cleanup incomplete");
                    }
                }
            }
        }

        info!(waves = results.len(), "all waves finished");
        Ok(results)
    }

    /// Run one wave to full collection.
    ///
    /// On an infrastructure error the (possibly partial) wave result is
    /// returned alongside the error.
    async fn execute_wave(
        &self,
        wave: &ExecutionWave,
        cancel: &CancellationToken,
        run_context: &Arc<RunContext>,
    ) -> std::result::Result<WaveResult, (WaveResult, WavedagError)> {
        let started = Instant::now();
        info!(wave = wave.number, tasks = wave.len(), "starting wave");

        let env = Arc::new(TaskEnv {
            graph: Arc::clone(&self.graph),
            state: Arc::clone(&self.state),
            runner: self.options.task_runner.clone(),
            isolation: self.options.isolation.clone(),
            worktree_root: self.options.worktree_root.clone(),
            progress: self.options.progress.clone(),
            run_context: Arc::clone(run_context),
            wave: wave.number,
        });

        let mut by_task: HashMap<TaskId, ParallelTaskResult> = HashMap::with_capacity(wave.len());

        // Split into must-skip and runnable against the state accumulated
        // by earlier waves.
        let mut runnable: Vec<TaskId> = Vec::new();
        {
            let mut state = self.lock_state();
            for id in &wave.tasks {
                match state.skip_cause(self.graph.dependencies_of(id)) {
                    Some(cause) => {
                        state.record_skip(id, &cause);
                        by_task.insert(
                            id.clone(),
                            ParallelTaskResult::skipped(id.clone(), cause.reason),
                        );
                    }
                    None => runnable.push(id.clone()),
                }
            }
        }

        for result in by_task.values() {
            warn!(
                wave = wave.number,
                task = %result.task_id,
                reason = result.skip_reason.as_deref().unwrap_or_default(),
                "skipping task"
            );
            env.transition(&result.task_id, NodeStatus::Skipped);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let mut join_set = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, TaskId> = HashMap::with_capacity(runnable.len());

        for id in runnable {
            let env = Arc::clone(&env);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let span = info_span!("task", wave = wave.number, task = %id);
            let task_id = id.clone();

            let handle = join_set.spawn(
                async move {
                    // Never closed; acquire cannot fail.
                    let _permit = semaphore.acquire_owned().await.ok();
                    run_single_task(env, task_id, cancel).await
                }
                .instrument(span),
            );
            spawned.insert(handle.id(), id);
        }

        let mut infra_error: Option<WavedagError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    by_task.insert(result.task_id.clone(), result);
                }
                Err(join_err) => {
                    let task = spawned
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".to_string());
                    error!(wave = wave.number, task = %task, error = %join_err, "task future did not complete");

                    let message = join_err.to_string();
                    let failure = TaskFailure::Runner(message.clone());
                    self.lock_state().record_failure(&task, failure.clone());
                    env.transition(&task, NodeStatus::Failed);
                    by_task.insert(
                        task.clone(),
                        ParallelTaskResult::failed(task.clone(), failure, started.elapsed(), None),
                    );
                    infra_error.get_or_insert(WavedagError::TaskJoin { task, message });
                }
            }
        }

        let results: Vec<ParallelTaskResult> = wave
            .tasks
            .iter()
            .filter_map(|id| by_task.remove(id))
            .collect();
        let wave_result = WaveResult::finished(wave.number, results, started.elapsed());

        info!(
            wave = wave.number,
            status = ?wave_result.status,
            succeeded = wave_result.succeeded().count(),
            failed = wave_result.failed().count(),
            skipped = wave_result.skipped().count(),
            elapsed = ?wave_result.duration,
            "wave finished"
        );

        match infra_error {
            Some(err) => Err((wave_result, err)),
            None => Ok(wave_result),
        }
    }

    /// Promote the workspaces of a wave's successful tasks, one at a time.
    ///
    /// Failed and skipped tasks are left alone. The first failing merge
    /// stops the batch and is returned; already merged tasks are not
    /// merged again. A no-op without an isolation manager.
    pub async fn merge_wave_worktrees(&self, wave: &WaveResult) -> Result<()> {
        let Some(isolation) = &self.options.isolation else {
            return Ok(());
        };

        for result in wave.succeeded() {
            let task = result.task_id.as_str();
            let merged = self.lock_state().worktree_merged(task);
            match merged {
                None => {
                    debug!(task = %task, "no tracked worktree; nothing to merge");
                    continue;
                }
                Some(true) => continue,
                Some(false) => {}
            }

            debug!(wave = wave.wave, task = %task, "merging worktree");
            isolation
                .update_status(task, WorktreeStatus::Merged)
                .await
                .map_err(|source| WavedagError::Merge {
                    task: task.to_string(),
                    source,
                })?;
            self.lock_state().mark_merged(task);
            info!(wave = wave.wave, task = %task, "worktree merged");
        }

        Ok(())
    }

    /// Remove the workspaces of a wave's merged tasks.
    ///
    /// Keeps going past individual failures and returns the last one.
    /// Workspaces of failed, skipped or unmerged tasks are kept for
    /// inspection. A no-op without an isolation manager.
    pub async fn cleanup_wave_worktrees(&self, wave: &WaveResult) -> Result<()> {
        let Some(isolation) = &self.options.isolation else {
            return Ok(());
        };

        let mut last_error = None;

        for result in wave.succeeded() {
            let task = result.task_id.as_str();
            let merged = self.lock_state().worktree_merged(task);
            if merged != Some(true) {
                continue;
            }

            match isolation.remove(task, true).await {
                Ok(()) => {
                    self.lock_state().forget_worktree(task);
                    debug!(wave = wave.wave, task = %task, "worktree removed");
                }
                Err(source) => {
                    warn!(wave = wave.wave, task = %task, error = %source, "failed to remove worktree");
                    last_error = Some(WavedagError::Cleanup {
                        task: task.to_string(),
                        source,
                    });
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a spawned task needs, shared across one wave.
struct TaskEnv {
    graph: Arc<DependencyGraph>,
    state: Arc<Mutex<ExecutorState>>,
    runner: Option<Arc<dyn TaskRunner>>,
    isolation: Option<Arc<dyn IsolationManager>>,
    worktree_root: PathBuf,
    progress: Option<ProgressCallback>,
    run_context: Arc<RunContext>,
    wave: usize,
}

impl TaskEnv {
    /// Set a node's status and report it to the progress callback.
    fn transition(&self, task: &str, status: NodeStatus) {
        if let Err(e) = self.graph.set_node_status(task, status) {
            warn!(task = %task, error = %e, "could not update node status");
            return;
        }
        if let Some(progress) = &self.progress {
            let line = self.graph.render_progress(self.wave);
            progress(self.wave, task, status, &line);
        }
    }

    fn fail(&self, task: &str, failure: TaskFailure) {
        warn!(task = %task, error = %failure, "task failed");
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_failure(task, failure);
        self.transition(task, NodeStatus::Failed);
    }
}

async fn run_single_task(
    env: Arc<TaskEnv>,
    task_id: TaskId,
    cancel: CancellationToken,
) -> ParallelTaskResult {
    let started = Instant::now();

    // Tasks queued behind the concurrency limit may get their slot after
    // the token fired; they must not start.
    if cancel.is_cancelled() {
        let failure = TaskFailure::Cancelled;
        env.fail(&task_id, failure.clone());
        return ParallelTaskResult::failed(task_id, failure, started.elapsed(), None);
    }

    env.transition(&task_id, NodeStatus::Running);
    info!(task = %task_id, "task started");

    let Some(runner) = env.runner.clone() else {
        let failure = TaskFailure::NoRunner;
        env.fail(&task_id, failure.clone());
        return ParallelTaskResult::failed(task_id, failure, started.elapsed(), None);
    };

    let mut worktree_path: Option<PathBuf> = None;
    if let Some(isolation) = &env.isolation {
        let path = env.worktree_root.join(&task_id);
        match isolation.create(&task_id, &task_id, &path).await {
            Ok(wt) => {
                debug!(task = %task_id, path = ?wt.path, "isolation workspace created");
                env.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .track_worktree(&task_id, &wt.path);
                worktree_path = Some(wt.path);
            }
            Err(e) => {
                let failure = TaskFailure::IsolationCreate(format!("{e:#}"));
                env.fail(&task_id, failure.clone());
                return ParallelTaskResult::failed(task_id, failure, started.elapsed(), None);
            }
        }
    }

    let invocation = TaskInvocation {
        task_id: &task_id,
        context: &env.run_context,
        workdir: worktree_path.as_deref(),
    };

    match runner.run_task(cancel, invocation).await {
        Ok(()) => {
            env.transition(&task_id, NodeStatus::Completed);
            info!(task = %task_id, elapsed = ?started.elapsed(), "task completed");
            ParallelTaskResult::succeeded(task_id, started.elapsed(), worktree_path)
        }
        Err(e) => {
            let failure = TaskFailure::Runner(format!("{e:#}"));
            env.fail(&task_id, failure.clone());
            ParallelTaskResult::failed(task_id, failure, started.elapsed(), worktree_path)
        }
    }
}
