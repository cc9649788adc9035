//! Task graph, scheduler and build tasks for kiln.
//!
//! Tasks are registered once into a [`TaskGraph`] and run by name through a
//! [`Scheduler`], which starts every task as soon as its dependencies finish.

pub mod config;
pub mod error;
pub mod glob;
pub mod graph;
pub mod leaf;
pub mod scheduler;
pub mod standard;
pub mod task;

pub use config::{BuildConfig, FontsConfig, GeneratorConfig, HtmlConfig, ScriptsConfig, StylesConfig};
pub use error::{GraphError, TaskError};
pub use glob::{GlobMatch, GlobPattern};
pub use graph::TaskGraph;
pub use scheduler::{BuildReport, FailurePolicy, Scheduler, TaskReport};
pub use standard::standard_graph;
pub use task::{Task, TaskFuture, TaskOutcome, TaskStatus};
