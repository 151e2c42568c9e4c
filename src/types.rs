// src/types.rs

//! Small shared types used across modules.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::Deserialize;

/// Boxed, sendable future returned by the collaborator traits
/// ([`TaskRunner`](crate::exec::TaskRunner),
/// [`IsolationManager`](crate::isolation::IsolationManager)).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifying context of a run, passed unchanged to every task runner call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Name of the plan target the tasks belong to.
    pub target: Option<String>,
    /// Extra key/value pairs made available to tasks.
    pub vars: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

/// How per-task isolation workspaces are provided.
///
/// - `None`: tasks share the working directory (default).
/// - `Git`: each task gets its own `git worktree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    #[default]
    None,
    Git,
}

impl FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(IsolationMode::None),
            "git" => Ok(IsolationMode::Git),
            other => Err(format!(
                "invalid isolation mode: {other} (expected \"none\" or \"git\")"
            )),
        }
    }
}
