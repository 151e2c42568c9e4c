mod common;
use crate::common::builders::TaskListBuilder;
use crate::common::{ScriptedRunner, init_tracing, record_progress, with_timeout};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use wavedag::dag::NodeStatus;
use wavedag::exec::{ExecutorOptions, ParallelExecutor, RunSummary, TaskFailure, WaveStatus};
use wavedag::types::RunContext;

fn executor_with(graph: Arc<wavedag::dag::DependencyGraph>, runner: Arc<ScriptedRunner>) -> ParallelExecutor {
    let options = ExecutorOptions::new().with_task_runner(runner);
    ParallelExecutor::new(graph, options)
}

#[tokio::test]
async fn failure_skips_direct_dependent_but_not_siblings() {
    init_tracing();

    let graph = TaskListBuilder::new()
        .task("A", &[])
        .task("B", &[])
        .task("C", &["A"])
        .task("D", &["B"])
        .build_graph();
    let runner = Arc::new(ScriptedRunner::new().fail("A"));
    let executor = executor_with(Arc::clone(&graph), Arc::clone(&runner));

    let waves = with_timeout(executor.execute_waves(&CancellationToken::new(), &RunContext::default()))
        .await
        .expect("run should not abort");

    assert_eq!(waves.len(), 2);
    assert_eq!(waves[0].status, WaveStatus::PartiallyFailed);
    assert!(waves[0].result_for("B").unwrap().success);

    let a = waves[0].result_for("A").unwrap();
    assert!(!a.success && !a.skipped);
    assert!(matches!(a.error, Some(TaskFailure::Runner(_))));

    let c = waves[1].result_for("C").unwrap();
    assert!(c.skipped && !c.success && c.error.is_none());
    assert!(c.skip_reason.as_deref().unwrap().contains("'A'"));

    let d = waves[1].result_for("D").unwrap();
    assert!(d.success);
    // Skips alone do not downgrade a wave.
    assert_eq!(waves[1].status, WaveStatus::Completed);

    let mut called = runner.called_tasks();
    called.sort();
    assert_eq!(called, vec!["A", "B", "D"]);

    assert_eq!(graph.node_status("A"), Some(NodeStatus::Failed));
    assert_eq!(graph.node_status("C"), Some(NodeStatus::Skipped));
    assert_eq!(graph.node_status("D"), Some(NodeStatus::Completed));
}

#[tokio::test]
async fn failure_cascades_transitively_down_a_chain() {
    init_tracing();

    let graph = TaskListBuilder::new()
        .task("A", &[])
        .task("B", &["A"])
        .task("C", &["B"])
        .task("D", &["C"])
        .build_graph();
    let runner = Arc::new(ScriptedRunner::new().fail("A"));
    let executor = executor_with(graph, Arc::clone(&runner));

    let waves = with_timeout(executor.execute_waves(&CancellationToken::new(), &RunContext::default()))
        .await
        .unwrap();

    assert_eq!(waves.len(), 4);
    let summary = RunSummary::from_waves(&waves);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(runner.call_count(), 1);

    let d = waves[3].result_for("D").unwrap();
    let reason = d.skip_reason.as_deref().unwrap();
    assert!(reason.contains("'C' was skipped"), "{reason}");
    assert!(reason.contains("root failure: 'A'"), "{reason}");

    let failed = executor.failed_tasks();
    assert_eq!(failed.len(), 1);
    assert!(failed.contains_key("A"));

    let skipped = executor.skipped_tasks();
    assert_eq!(skipped.len(), 3);
    for id in ["B", "C", "D"] {
        assert!(skipped.contains_key(id), "{id} should be skipped");
    }
}

#[tokio::test]
async fn diamond_with_one_failed_branch_skips_the_join() {
    init_tracing();

    let graph = TaskListBuilder::new()
        .task("A", &[])
        .task("B", &["A"])
        .task("C", &["A"])
        .task("D", &["B", "C"])
        .build_graph();
    let runner = Arc::new(ScriptedRunner::new().fail("C"));
    let executor = executor_with(graph, Arc::clone(&runner));

    let waves = executor
        .execute_waves(&CancellationToken::new(), &RunContext::default())
        .await
        .unwrap();

    assert!(waves[1].result_for("B").unwrap().success);
    let d = waves[2].result_for("D").unwrap();
    assert!(d.skipped);
    assert!(d.skip_reason.as_deref().unwrap().contains("'C'"));
    assert!(!runner.called_tasks().contains(&"D".to_string()));
}

#[tokio::test]
async fn results_follow_wave_order() {
    let graph = TaskListBuilder::new().independent("t", 6).build_graph();
    let runner = Arc::new(
        ScriptedRunner::new()
            .with_task_delay("t0", std::time::Duration::from_millis(40))
            .with_task_delay("t3", std::time::Duration::from_millis(20)),
    );
    let executor = executor_with(graph, runner);

    let waves = executor
        .execute_waves(&CancellationToken::new(), &RunContext::default())
        .await
        .unwrap();

    let ids: Vec<&str> = waves[0].results.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, vec!["t0", "t1", "t2", "t3", "t4", "t5"]);
}

#[tokio::test]
async fn missing_runner_fails_every_runnable_task() {
    init_tracing();

    let graph = TaskListBuilder::new()
        .task("A", &[])
        .task("B", &[])
        .task("C", &["A"])
        .build_graph();
    let executor = ParallelExecutor::new(graph, ExecutorOptions::new());

    let waves = executor
        .execute_waves(&CancellationToken::new(), &RunContext::default())
        .await
        .unwrap();

    for id in ["A", "B"] {
        let r = waves[0].result_for(id).unwrap();
        assert_eq!(r.error, Some(TaskFailure::NoRunner));
    }
    assert!(waves[1].result_for("C").unwrap().skipped);
}

#[tokio::test]
async fn run_context_is_passed_unchanged() {
    let graph = TaskListBuilder::new().task("A", &[]).task("B", &["A"]).build_graph();
    let runner = Arc::new(ScriptedRunner::new());
    let executor = executor_with(graph, Arc::clone(&runner));

    let ctx = RunContext::new("feature-x").with_var("PROFILE", "release");
    executor
        .execute_waves(&CancellationToken::new(), &ctx)
        .await
        .unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert_eq!(call.context, ctx);
        assert!(call.workdir.is_none());
    }
}

#[tokio::test]
async fn progress_reports_every_transition() {
    let graph = TaskListBuilder::new()
        .task("A", &[])
        .task("B", &["A"])
        .build_graph();
    let runner = Arc::new(ScriptedRunner::new().fail("A"));
    let (options, events) = record_progress(ExecutorOptions::new().with_task_runner(runner));
    let executor = ParallelExecutor::new(graph, options);

    executor
        .execute_waves(&CancellationToken::new(), &RunContext::default())
        .await
        .unwrap();

    let events = events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (1, "A".to_string(), NodeStatus::Running),
            (1, "A".to_string(), NodeStatus::Failed),
            (2, "B".to_string(), NodeStatus::Skipped),
        ]
    );
}

#[tokio::test]
async fn progress_line_reflects_wave_state() {
    let graph = TaskListBuilder::new().task("A", &[]).build_graph();
    let lines = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let options = ExecutorOptions::new()
        .with_task_runner(Arc::new(ScriptedRunner::new()))
        .with_progress(move |_, _, _, line| sink.lock().unwrap().push(line.to_string()));

    ParallelExecutor::new(graph, options)
        .execute_waves(&CancellationToken::new(), &RunContext::default())
        .await
        .unwrap();

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("1 running"), "{}", lines[0]);
    assert!(lines[1].starts_with("wave 1/1 [1/1 done"), "{}", lines[1]);
    assert!(lines[1].ends_with("A=completed"), "{}", lines[1]);
}

#[tokio::test]
async fn dry_run_matches_execution_order() {
    let graph = TaskListBuilder::new()
        .task("A", &[])
        .task("B", &["A"])
        .task("C", &[])
        .task("D", &["B", "C"])
        .build_graph();
    let runner = Arc::new(ScriptedRunner::new());
    let executor = executor_with(graph, Arc::clone(&runner));

    let planned = executor.dry_run().unwrap();
    assert_eq!(runner.call_count(), 0);

    let waves = executor
        .execute_waves(&CancellationToken::new(), &RunContext::default())
        .await
        .unwrap();

    assert_eq!(planned.len(), waves.len());
    for (plan, ran) in planned.iter().zip(&waves) {
        assert_eq!(plan.number, ran.wave);
        let ran_ids: Vec<&String> = ran.results.iter().map(|r| &r.task_id).collect();
        let plan_ids: Vec<&String> = plan.tasks.iter().collect();
        assert_eq!(plan_ids, ran_ids);
    }
    assert_eq!(executor.get_wave_stats().total_tasks, 4);
}

#[tokio::test]
async fn failed_and_skipped_maps_are_copies() {
    let graph = TaskListBuilder::new().task("A", &[]).task("B", &["A"]).build_graph();
    let executor = executor_with(graph, Arc::new(ScriptedRunner::new().fail("A")));
    executor
        .execute_waves(&CancellationToken::new(), &RunContext::default())
        .await
        .unwrap();

    let mut failed = executor.failed_tasks();
    failed.clear();
    let mut skipped = executor.skipped_tasks();
    skipped.insert("X".into(), "made up".into());

    assert_eq!(executor.failed_tasks().len(), 1);
    assert_eq!(executor.skipped_tasks().len(), 1);
}
