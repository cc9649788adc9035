//! Development server command.

use std::sync::Arc;

use anyhow::Result;
use kiln_server::{DevServer, Rebuilder};
use kiln_tasks::standard::BUILD;
use kiln_tasks::Scheduler;

use crate::config::Project;

/// Build, then watch and serve.
pub async fn run(project: &Project, port: Option<u16>, no_open: bool, fail_fast: bool) -> Result<()> {
    let config = project.server_config(port, no_open);
    tracing::info!("Starting development server on port {}", config.port);

    let rebuilder = Rebuilder::new(
        Arc::new(project.graph()?),
        Scheduler::new(project.policy(fail_fast)),
        vec![BUILD.to_string()],
    );

    DevServer::new(config, rebuilder).start().await?;

    Ok(())
}
