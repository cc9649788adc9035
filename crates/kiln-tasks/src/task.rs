//! Task trait and task outcomes.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::TaskError;

/// Future returned by [`Task::run`].
pub type TaskFuture = BoxFuture<'static, Result<TaskOutcome, TaskError>>;

/// A unit of work in the task graph.
///
/// Tasks receive everything they need at construction time; `run` takes no
/// arguments so the scheduler can spawn it on its own.
pub trait Task: Send + Sync + 'static {
    /// One-line description shown by `kiln list`.
    fn description(&self) -> String;

    /// Run the task once.
    fn run(self: Arc<Self>) -> TaskFuture;
}

/// What a successful task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task did its work and wrote these files
    Completed { outputs: Vec<PathBuf> },

    /// The task had nothing to do
    Skipped { reason: String },
}

impl TaskOutcome {
    /// Completed without output files.
    pub fn done() -> Self {
        TaskOutcome::Completed {
            outputs: Vec::new(),
        }
    }
}

/// Final state of a task within one scheduler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded { outputs: Vec<PathBuf> },
    Skipped { reason: String },
    Failed { error: String },

    /// Not run because a dependency did not succeed
    Blocked { dependency: String },

    /// Aborted or never started after a fail-fast stop
    Cancelled,
}

impl TaskStatus {
    /// Whether this status counts as success for the build.
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskStatus::Succeeded { .. } | TaskStatus::Skipped { .. })
    }

    /// Short label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Succeeded { .. } => "ok",
            TaskStatus::Skipped { .. } => "skipped",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::Blocked { .. } => "blocked",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl From<Result<TaskOutcome, TaskError>> for TaskStatus {
    fn from(result: Result<TaskOutcome, TaskError>) -> Self {
        match result {
            Ok(TaskOutcome::Completed { outputs }) => TaskStatus::Succeeded { outputs },
            Ok(TaskOutcome::Skipped { reason }) => TaskStatus::Skipped { reason },
            Err(e) => TaskStatus::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// A task that only waits for its dependencies.
#[derive(Debug, Clone)]
pub struct Composite {
    dependencies: Vec<String>,
}

impl Composite {
    pub fn new(dependencies: &[&str]) -> Self {
        Self {
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl Task for Composite {
    fn description(&self) -> String {
        format!("Run {}", self.dependencies.join(", "))
    }

    fn run(self: Arc<Self>) -> TaskFuture {
        Box::pin(async { Ok(TaskOutcome::done()) })
    }
}
