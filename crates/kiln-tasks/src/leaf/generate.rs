//! External site generator.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::config::BuildConfig;
use crate::error::TaskError;
use crate::task::{Task, TaskFuture, TaskOutcome};

/// Runs the configured site generator in the project root.
pub struct GenerateSite {
    config: Arc<BuildConfig>,
}

impl GenerateSite {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self { config }
    }

    fn command_line(&self) -> String {
        let generator = &self.config.generator;
        std::iter::once(generator.command.as_str())
            .chain(generator.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Task for GenerateSite {
    fn description(&self) -> String {
        format!("Run `{}`", self.command_line())
    }

    fn run(self: Arc<Self>) -> TaskFuture {
        Box::pin(async move {
            let generator = &self.config.generator;
            if !generator.enabled {
                return Ok(TaskOutcome::Skipped {
                    reason: "generator disabled".to_string(),
                });
            }

            let command = self.command_line();
            tracing::debug!("Running {} in {}", command, self.config.root.display());

            // Generator output goes straight to the terminal
            let status = Command::new(&generator.command)
                .args(&generator.args)
                .current_dir(&self.config.root)
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|e| TaskError::SpawnError {
                    command: command.clone(),
                    message: e.to_string(),
                })?;

            if !status.success() {
                return Err(TaskError::CommandFailed {
                    command,
                    status: status.to_string(),
                });
            }

            Ok(TaskOutcome::done())
        })
    }
}
