//! Site build command.

use anyhow::Result;
use kiln_tasks::standard::DEFAULT;

use crate::commands::run::run_tasks;
use crate::config::Project;

/// Run the `default` task.
pub async fn run(project: &Project, fail_fast: bool) -> Result<()> {
    tracing::info!("Building {}", project.root().display());
    run_tasks(project, &[DEFAULT], fail_fast).await
}
