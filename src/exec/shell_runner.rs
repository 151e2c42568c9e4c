// src/exec/shell_runner.rs

//! Task runner that executes a shell command per task.

use std::collections::HashMap;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::TaskId;
use crate::exec::runner::{TaskInvocation, TaskRunner};
use crate::types::BoxFuture;

/// Environment variable carrying the task id into the child process.
pub const TASK_ID_ENV: &str = "WAVEDAG_TASK_ID";
/// Environment variable carrying `RunContext::target` into the child process.
pub const TARGET_ENV: &str = "WAVEDAG_TARGET";

/// Runs `sh -c <cmd>` (`cmd /C` on Windows) for each task.
///
/// The child runs inside the task's isolation workspace when there is one.
/// A non-zero exit status is a task failure; cancellation kills the child.
#[derive(Debug, Clone, Default)]
pub struct ShellTaskRunner {
    commands: HashMap<TaskId, String>,
}

impl ShellTaskRunner {
    pub fn new(commands: HashMap<TaskId, String>) -> Self {
        Self { commands }
    }

    pub fn with_command(mut self, task: impl Into<TaskId>, cmd: impl Into<String>) -> Self {
        self.commands.insert(task.into(), cmd.into());
        self
    }

    async fn run(&self, cancel: CancellationToken, task: TaskInvocation<'_>) -> Result<()> {
        let cmd_str = self
            .commands
            .get(task.task_id)
            .ok_or_else(|| anyhow!("no command configured for task '{}'", task.task_id))?;

        info!(task = %task.task_id, cmd = %cmd_str, workdir = ?task.workdir, "starting task process");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(cmd_str);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(cmd_str);
            c
        };

        if let Some(dir) = task.workdir {
            cmd.current_dir(dir);
        }
        cmd.env(TASK_ID_ENV, task.task_id);
        if let Some(target) = &task.context.target {
            cmd.env(TARGET_ENV, target);
        }
        cmd.envs(&task.context.vars);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", task.task_id))?;

        // Always drain both pipes so the child never blocks on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            let name = task.task_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %name, "stdout: {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let name = task.task_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %name, "stderr: {}", line);
                }
            });
        }

        tokio::select! {
            status_res = child.wait() => {
                let status = status_res.with_context(|| {
                    format!("waiting for process of task '{}'", task.task_id)
                })?;
                let code = status.code().unwrap_or(-1);

                info!(
                    task = %task.task_id,
                    exit_code = code,
                    success = status.success(),
                    "task process exited"
                );

                if !status.success() {
                    bail!("command for task '{}' exited with code {}", task.task_id, code);
                }
                Ok(())
            }

            _ = cancel.cancelled() => {
                info!(task = %task.task_id, "cancellation requested; killing task process");
                if let Err(e) = child.kill().await {
                    warn!(task = %task.task_id, error = %e, "failed to kill child process on cancellation");
                }
                bail!("task '{}' cancelled", task.task_id)
            }
        }
    }
}

impl TaskRunner for ShellTaskRunner {
    fn run_task<'a>(
        &'a self,
        cancel: CancellationToken,
        task: TaskInvocation<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(cancel, task))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::RunContext;

    fn invocation<'a>(task_id: &'a str, ctx: &'a RunContext) -> TaskInvocation<'a> {
        TaskInvocation {
            task_id,
            context: ctx,
            workdir: None,
        }
    }

    #[tokio::test]
    async fn successful_command() {
        let runner = ShellTaskRunner::default().with_command("ok", "true");
        let ctx = RunContext::default();
        runner
            .run_task(CancellationToken::new(), invocation("ok", &ctx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let runner = ShellTaskRunner::default().with_command("bad", "exit 3");
        let ctx = RunContext::default();
        let err = runner
            .run_task(CancellationToken::new(), invocation("bad", &ctx))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with code 3"), "{err}");
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let runner = ShellTaskRunner::default();
        let ctx = RunContext::default();
        let err = runner
            .run_task(CancellationToken::new(), invocation("ghost", &ctx))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no command configured"));
    }

    #[tokio::test]
    async fn context_is_exported_to_the_child() {
        let runner = ShellTaskRunner::default().with_command(
            "env",
            r#"test "$WAVEDAG_TASK_ID" = env && test "$WAVEDAG_TARGET" = plan-7 && test "$EXTRA" = yes"#,
        );
        let ctx = RunContext::new("plan-7").with_var("EXTRA", "yes");
        runner
            .run_task(CancellationToken::new(), invocation("env", &ctx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn runs_inside_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellTaskRunner::default().with_command("touch", "touch marker");
        let ctx = RunContext::default();
        runner
            .run_task(
                CancellationToken::new(),
                TaskInvocation {
                    task_id: "touch",
                    context: &ctx,
                    workdir: Some(dir.path()),
                },
            )
            .await
            .unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn cancellation_kills_long_running_command() {
        let runner = ShellTaskRunner::default().with_command("slow", "sleep 30");
        let ctx = RunContext::default();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            runner.run_task(cancel, invocation("slow", &ctx)),
        )
        .await
        .expect("runner did not observe cancellation");
        assert!(res.unwrap_err().to_string().contains("cancelled"));
    }
}
