//! Task and graph errors.

use kiln_bundle::BundleError;

/// Errors returned by a running task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Failed to spawn `{command}`: {message}")]
    SpawnError { command: String, message: String },

    #[error("`{command}` failed: {status}")]
    CommandFailed { command: String, status: String },

    #[error("{failed} stylesheet(s) failed to compile; first error: {first}")]
    StylesFailed { failed: usize, first: String },

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("Invalid glob pattern `{pattern}`: {message}")]
    GlobError { pattern: String, message: String },

    #[error("Failed to write {path}: {message}")]
    WriteError { path: String, message: String },

    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Errors raised while registering or looking up tasks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on unregistered task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task graph contains a cycle at '{0}'")]
    Cycle(String),
}
