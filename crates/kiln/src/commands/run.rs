//! Run named tasks.

use anyhow::{bail, Result};
use kiln_tasks::{BuildReport, Scheduler, TaskStatus};

use crate::config::Project;

/// Run the given tasks.
pub async fn run(project: &Project, tasks: &[String], fail_fast: bool) -> Result<()> {
    let targets: Vec<&str> = tasks.iter().map(String::as_str).collect();
    run_tasks(project, &targets, fail_fast).await
}

/// Run `targets` with the project's task graph and fail if any task did.
pub async fn run_tasks(project: &Project, targets: &[&str], fail_fast: bool) -> Result<()> {
    let graph = project.graph()?;
    let scheduler = Scheduler::new(project.policy(fail_fast));

    let report = scheduler.run(&graph, targets).await?;
    check(&report)
}

/// Log the outcome of a run; an error when anything did not succeed.
fn check(report: &BuildReport) -> Result<()> {
    let failures: Vec<_> = report.failures().collect();

    if failures.is_empty() {
        tracing::info!("Done in {} ms", report.duration.as_millis());
        return Ok(());
    }

    for task in &failures {
        match &task.status {
            TaskStatus::Failed { error } => tracing::error!("{} failed: {}", task.name, error),
            TaskStatus::Blocked { dependency } => {
                tracing::warn!("{} did not run because {} failed", task.name, dependency)
            }
            status => tracing::warn!("{} {}", task.name, status.label()),
        }
    }

    bail!(
        "{} of {} tasks did not succeed",
        failures.len(),
        report.tasks.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_tasks::TaskReport;
    use std::time::Duration;

    fn report(statuses: Vec<(&str, TaskStatus)>) -> BuildReport {
        BuildReport {
            tasks: statuses
                .into_iter()
                .map(|(name, status)| TaskReport {
                    name: name.to_string(),
                    status,
                    duration: Duration::ZERO,
                })
                .collect(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn skipped_tasks_still_succeed() {
        let report = report(vec![
            ("copy-html", TaskStatus::Succeeded { outputs: vec![] }),
            (
                "bundle-scripts",
                TaskStatus::Skipped {
                    reason: "src/index.js does not exist".to_string(),
                },
            ),
        ]);

        assert!(check(&report).is_ok());
    }

    #[test]
    fn failures_are_errors() {
        let report = report(vec![
            (
                "generate-site",
                TaskStatus::Failed {
                    error: "`hugo` failed: exit status: 1".to_string(),
                },
            ),
            (
                "build",
                TaskStatus::Blocked {
                    dependency: "generate-site".to_string(),
                },
            ),
        ]);

        let err = check(&report).unwrap_err();
        assert_eq!(err.to_string(), "2 of 2 tasks did not succeed");
    }
}
