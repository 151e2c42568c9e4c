// src/config/validate.rs

use crate::config::model::{PlanFile, RawPlanFile, task_specs};
use crate::dag::DependencyGraph;
use crate::errors::{Result, WavedagError};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = WavedagError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw.executor, raw.vars, raw.task))
    }
}

/// Run every validation step against a raw plan.
pub fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_executor(plan)?;
    validate_commands(plan)?;
    validate_dag(plan)?;
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(WavedagError::ConfigError(
            "plan must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(plan: &RawPlanFile) -> Result<()> {
    if plan.executor.max_parallel == 0 {
        return Err(WavedagError::ConfigError(
            "[executor].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }
    if plan.executor.worktree_root.trim().is_empty() {
        return Err(WavedagError::ConfigError(
            "[executor].worktree_root must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_commands(plan: &RawPlanFile) -> Result<()> {
    for (id, task) in plan.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(WavedagError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                id
            )));
        }
    }
    Ok(())
}

/// Unknown/self dependencies and cycles are reported with the same errors
/// the graph itself raises.
fn validate_dag(plan: &RawPlanFile) -> Result<()> {
    let mut graph = DependencyGraph::build(task_specs(&plan.task))?;
    graph.compute_waves()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<PlanFile> {
        let raw: RawPlanFile = toml::from_str(toml_src)?;
        PlanFile::try_from(raw)
    }

    #[test]
    fn defaults_are_applied() {
        let plan = parse(
            r#"
[task.A]
cmd = "echo A"
"#,
        )
        .unwrap();
        assert_eq!(plan.executor.max_parallel, 4);
        assert_eq!(plan.executor.isolation, crate::types::IsolationMode::None);
        assert!(!plan.executor.auto_merge);
        assert!(plan.task["A"].after.is_empty());
    }

    #[test]
    fn empty_plan_is_rejected() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, WavedagError::ConfigError(msg) if msg.contains("at least one")));
    }

    #[test]
    fn zero_max_parallel_is_rejected() {
        let err = parse(
            r#"
[executor]
max_parallel = 0

[task.A]
cmd = "echo A"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, WavedagError::ConfigError(msg) if msg.contains("max_parallel")));
    }

    #[test]
    fn blank_command_is_rejected() {
        let err = parse(
            r#"
[task.A]
cmd = "  "
"#,
        )
        .unwrap_err();
        assert!(matches!(err, WavedagError::ConfigError(msg) if msg.contains("'A'")));
    }

    #[test]
    fn invalid_isolation_mode_fails_to_parse() {
        let err = parse(
            r#"
[executor]
isolation = "svn"

[task.A]
cmd = "echo A"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, WavedagError::TomlError(_)));
    }

    #[test]
    fn graph_errors_surface_from_validation() {
        let err = parse(
            r#"
[task.A]
cmd = "echo A"
after = ["A"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, WavedagError::SelfDependency(id) if id == "A"));
    }
}
