// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod isolation;
pub mod logging;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::PlanFile;
use crate::config::loader::load_and_validate;
use crate::dag::DependencyGraph;
use crate::exec::{ExecutorOptions, ParallelExecutor, RunSummary, ShellTaskRunner, WaveResult};
use crate::isolation::GitWorktreeManager;
use crate::types::IsolationMode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading and validation
/// - dependency graph + wave partition
/// - executor with the shell task runner and optional git worktrees
/// - Ctrl-C handling
/// - the final summary
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let plan = load_and_validate(&config_path)?;
    let graph = Arc::new(plan.dependency_graph()?);

    if args.dry_run {
        print_dry_run(&plan, &graph)?;
        return Ok(());
    }

    let max_parallel = args
        .max_parallel
        .map(usize::from)
        .unwrap_or(plan.executor.max_parallel);

    let mut options = ExecutorOptions::new()
        .with_max_parallel(max_parallel)
        .with_task_runner(Arc::new(ShellTaskRunner::new(plan.commands())))
        .with_auto_merge(plan.executor.auto_merge)
        .with_progress(|wave, task, status, line| {
            info!(wave, task, %status, "{line}");
        });

    if plan.executor.isolation == IsolationMode::Git {
        let repo_root = config_root_dir(&config_path);
        info!(repo_root = ?repo_root, "using git worktrees for task isolation");
        options = options
            .with_isolation(Arc::new(GitWorktreeManager::new(repo_root)))
            .with_worktree_root(plan.worktree_root());
    }

    let mut run_context = plan.run_context();
    if let Some(target) = args.target {
        run_context.target = Some(target);
    }

    let executor = ParallelExecutor::new(graph, options);

    // Ctrl-C → stop before the next wave; running tasks see the token too.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl+C received; cancelling run");
            cancel.cancel();
        });
    }

    let (waves, aborted) = match executor.execute_waves(&cancel, &run_context).await {
        Ok(waves) => (waves, None),
        Err(aborted) => (aborted.completed, Some(aborted.source)),
    };

    print_summary(&waves);

    if let Some(err) = aborted {
        return Err(err.into());
    }

    let summary = RunSummary::from_waves(&waves);
    if !summary.all_succeeded() {
        bail!(
            "{} task(s) failed and {} were skipped",
            summary.failed,
            summary.skipped
        );
    }

    Ok(())
}

/// Directory the plan lives in; worktrees and git commands are rooted here.
///
/// A bare filename like "Wavedag.toml" (parent = "") falls back to the
/// current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run output: executor settings, wave statistics and the partition.
fn print_dry_run(plan: &PlanFile, graph: &DependencyGraph) -> Result<()> {
    let stats = graph.get_wave_stats();

    println!("wavedag dry-run");
    println!("  executor.max_parallel = {}", plan.executor.max_parallel);
    println!("  executor.isolation = {:?}", plan.executor.isolation);
    println!("  executor.auto_merge = {}", plan.executor.auto_merge);
    if let Some(target) = &plan.executor.target {
        println!("  executor.target = {target}");
    }
    println!(
        "  {} task(s) in {} wave(s) (largest {}, smallest {})",
        stats.total_tasks, stats.total_waves, stats.max_wave_size, stats.min_wave_size
    );
    println!();

    for wave in graph.waves()? {
        println!("wave {} ({} task(s)):", wave.number, wave.len());
        for id in &wave.tasks {
            println!("  - {id}");
            if let Some(task) = plan.task.get(id) {
                println!("      cmd: {}", task.cmd);
            }
            let deps = graph.dependencies_of(id);
            if !deps.is_empty() {
                println!("      after: {:?}", deps);
            }
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_summary(waves: &[WaveResult]) {
    for wave in waves {
        println!("wave {}: {:?} in {:.2?}", wave.wave, wave.status, wave.duration);
        for result in &wave.results {
            if result.skipped {
                println!(
                    "  - {} skipped: {}",
                    result.task_id,
                    result.skip_reason.as_deref().unwrap_or("")
                );
            } else if let Some(err) = &result.error {
                println!("  - {} failed: {err}", result.task_id);
            } else {
                println!("  - {} ok ({:.2?})", result.task_id, result.duration);
            }
        }
    }
    println!("{}", RunSummary::from_waves(waves));
}
