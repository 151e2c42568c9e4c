use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tokio_util::sync::CancellationToken;
use wavedag::exec::{TaskInvocation, TaskRunner};
use wavedag::types::{BoxFuture, RunContext};

/// One recorded runner call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub task_id: String,
    pub context: RunContext,
    pub workdir: Option<PathBuf>,
}

/// A fake task runner that:
/// - records every call (task, context, workdir)
/// - fails or panics for configured tasks
/// - sleeps for a configurable delay, returning early on cancellation
/// - tracks the highest number of simultaneously running calls.
#[derive(Default)]
pub struct ScriptedRunner {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
    task_delay: HashMap<String, Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }

    pub fn panic_on(mut self, task: &str) -> Self {
        self.panicking.insert(task.to_string());
        self
    }

    /// Delay applied to every task without its own delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_task_delay(mut self, task: &str, delay: Duration) -> Self {
        self.task_delay.insert(task.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_tasks(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.task_id).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run(&self, cancel: CancellationToken, task: TaskInvocation<'_>) -> Result<()> {
        let id = task.task_id.to_string();
        self.calls.lock().unwrap().push(RecordedCall {
            task_id: id.clone(),
            context: task.context.clone(),
            workdir: task.workdir.map(|p| p.to_path_buf()),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.task_delay.get(&id).copied().unwrap_or(self.delay);
        let cancelled = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = cancel.cancelled() => true,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&id) {
            panic!("scripted panic in task '{id}'");
        }
        if cancelled {
            bail!("task '{id}' cancelled");
        }
        if self.failing.contains(&id) {
            return Err(anyhow!("scripted failure for task '{id}'"));
        }
        Ok(())
    }
}

impl TaskRunner for ScriptedRunner {
    fn run_task<'a>(
        &'a self,
        cancel: CancellationToken,
        task: TaskInvocation<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(cancel, task))
    }
}
