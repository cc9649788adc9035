//! Concurrent task scheduler.
//!
//! Runs the dependency closure of the requested targets. A task starts as
//! soon as all of its dependencies have finished; independent tasks run
//! concurrently on a tokio `JoinSet`.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use petgraph::graph::NodeIndex;
use tokio::task::{Id, JoinSet};

use crate::error::{GraphError, TaskError};
use crate::graph::TaskGraph;
use crate::task::{TaskOutcome, TaskStatus};

/// How the scheduler reacts to a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Keep running everything that does not depend on the failure
    #[default]
    BestEffort,

    /// Abort running tasks and start nothing new
    FailFast,
}

/// Result of one task within a run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub duration: Duration,
}

/// Result of a scheduler run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Per-task results, in completion order
    pub tasks: Vec<TaskReport>,

    /// Wall-clock time of the whole run
    pub duration: Duration,
}

impl BuildReport {
    /// True when every task succeeded or was skipped.
    pub fn success(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_ok())
    }

    /// Status of a task, if it was part of the run.
    pub fn status(&self, name: &str) -> Option<&TaskStatus> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.status)
    }

    /// Tasks that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| !t.status.is_ok())
    }
}

/// Runs tasks from a [`TaskGraph`].
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    policy: FailurePolicy,
}

impl Scheduler {
    /// Create a scheduler with the given failure policy.
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run `targets` and everything they depend on.
    pub async fn run(&self, graph: &TaskGraph, targets: &[&str]) -> Result<BuildReport, GraphError> {
        let started = Instant::now();
        let mut pending = graph.closure(targets)?;

        let mut statuses: HashMap<NodeIndex, TaskStatus> = HashMap::new();
        let mut running = Running::default();
        let mut set: JoinSet<Result<TaskOutcome, TaskError>> = JoinSet::new();
        let mut report = BuildReport::default();
        let mut halted = false;

        loop {
            if !halted {
                self.start_ready(graph, &mut pending, &mut statuses, &mut running, &mut set, &mut report);
            }

            let Some(joined) = set.join_next_with_id().await else {
                break;
            };

            let (id, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_cancelled() => continue,
                // Panics while polling are caught inside the task; this is
                // one that escaped, e.g. from dropping the task's future
                Err(e) => {
                    let id = e.id();
                    let message = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    (id, Err(TaskError::Panicked(message)))
                }
            };
            let Some((idx, elapsed)) = running.finish(id) else {
                tracing::error!("Joined unknown task {}", id);
                continue;
            };

            let name = graph.node(idx).name.clone();
            let status = TaskStatus::from(result);
            log_finished(&name, &status, elapsed);

            if !status.is_ok() && self.policy == FailurePolicy::FailFast && !halted {
                tracing::warn!("Stopping after '{}' failed", name);
                halted = true;
                set.abort_all();
            }

            statuses.insert(idx, status.clone());
            report.tasks.push(TaskReport {
                name,
                status,
                duration: elapsed,
            });
        }

        // Whatever was aborted or never started
        let mut leftover: Vec<NodeIndex> = running.into_nodes().chain(pending).collect();
        leftover.sort();
        for idx in leftover {
            report.tasks.push(TaskReport {
                name: graph.node(idx).name.clone(),
                status: TaskStatus::Cancelled,
                duration: Duration::ZERO,
            });
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    /// Spawn every pending task whose dependencies are done. Tasks behind a
    /// failed dependency are marked blocked instead.
    fn start_ready(
        &self,
        graph: &TaskGraph,
        pending: &mut Vec<NodeIndex>,
        statuses: &mut HashMap<NodeIndex, TaskStatus>,
        running: &mut Running,
        set: &mut JoinSet<Result<TaskOutcome, TaskError>>,
        report: &mut BuildReport,
    ) {
        let mut i = 0;
        while i < pending.len() {
            let idx = pending[i];
            let deps = graph.dependency_indices(idx);
            if !deps.iter().all(|d| statuses.contains_key(d)) {
                i += 1;
                continue;
            }
            pending.remove(i);

            let name = graph.node(idx).name.clone();
            if let Some(failed) = deps.iter().find(|d| !statuses[*d].is_ok()) {
                let dependency = graph.node(*failed).name.clone();
                tracing::warn!("Skipping '{}': '{}' did not succeed", name, dependency);
                let status = TaskStatus::Blocked { dependency };
                statuses.insert(idx, status.clone());
                report.tasks.push(TaskReport {
                    name,
                    status,
                    duration: Duration::ZERO,
                });
                // A new status may release tasks earlier in the list
                i = 0;
                continue;
            }

            tracing::info!("Starting '{}'...", name);
            let task = Arc::clone(&graph.node(idx).task);
            let handle = set.spawn(async move {
                AssertUnwindSafe(task.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic))))
            });
            running.start(handle.id(), idx);
        }
    }
}

/// Tasks in flight, keyed by tokio task id.
#[derive(Default)]
struct Running {
    tasks: HashMap<Id, (NodeIndex, Instant)>,
}

impl Running {
    fn start(&mut self, id: Id, idx: NodeIndex) {
        self.tasks.insert(id, (idx, Instant::now()));
    }

    /// Forget a joined task, returning its node and run time.
    fn finish(&mut self, id: Id) -> Option<(NodeIndex, Duration)> {
        self.tasks
            .remove(&id)
            .map(|(idx, started)| (idx, started.elapsed()))
    }

    fn into_nodes(self) -> impl Iterator<Item = NodeIndex> {
        self.tasks.into_values().map(|(idx, _)| idx)
    }
}

fn log_finished(name: &str, status: &TaskStatus, elapsed: Duration) {
    let ms = elapsed.as_millis();
    match status {
        TaskStatus::Succeeded { outputs } => {
            tracing::info!("Finished '{}' after {} ms ({} files)", name, ms, outputs.len());
        }
        TaskStatus::Skipped { reason } => {
            tracing::info!("Skipped '{}': {}", name, reason);
        }
        TaskStatus::Failed { error } => {
            tracing::error!("'{}' errored after {} ms: {}", name, ms, error);
        }
        TaskStatus::Blocked { .. } | TaskStatus::Cancelled => {}
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskFuture};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    /// What a test task does when run.
    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
        Rendezvous(Arc<Barrier>),
    }

    struct TestTask {
        behaviour: Behaviour,
        runs: Arc<AtomicUsize>,
    }

    impl TestTask {
        fn new(behaviour: Behaviour) -> (Self, Arc<AtomicUsize>) {
            let runs = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    behaviour,
                    runs: Arc::clone(&runs),
                },
                runs,
            )
        }
    }

    impl Task for TestTask {
        fn description(&self) -> String {
            "test".to_string()
        }

        fn run(self: Arc<Self>) -> TaskFuture {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
                match &self.behaviour {
                    Behaviour::Succeed => Ok(TaskOutcome::done()),
                    Behaviour::Fail => Err(TaskError::CommandFailed {
                        command: "test".to_string(),
                        status: "exit status: 1".to_string(),
                    }),
                    Behaviour::Panic => panic!("task exploded"),
                    Behaviour::Sleep(d) => {
                        tokio::time::sleep(*d).await;
                        Ok(TaskOutcome::done())
                    }
                    Behaviour::Rendezvous(barrier) => {
                        barrier.wait().await;
                        Ok(TaskOutcome::done())
                    }
                }
            })
        }
    }

    #[tokio::test]
    async fn runs_independent_leaves_concurrently() {
        // Both leaves must be in flight at once to pass the barrier
        let barrier = Arc::new(Barrier::new(2));
        let mut graph = TaskGraph::new();
        let (a, _) = TestTask::new(Behaviour::Rendezvous(Arc::clone(&barrier)));
        let (b, _) = TestTask::new(Behaviour::Rendezvous(barrier));
        graph.register("a", a, &[]).unwrap();
        graph.register("b", b, &[]).unwrap();
        graph.composite("build", &["a", "b"]).unwrap();

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            Scheduler::default().run(&graph, &["build"]),
        )
        .await
        .expect("leaves did not run concurrently")
        .unwrap();

        assert!(report.success());
        assert_eq!(report.tasks.len(), 3);
        assert_eq!(report.tasks.last().unwrap().name, "build");
    }

    #[tokio::test]
    async fn composite_waits_for_all_dependencies() {
        let mut graph = TaskGraph::new();
        let (slow, _) = TestTask::new(Behaviour::Sleep(Duration::from_millis(50)));
        let (fast, _) = TestTask::new(Behaviour::Succeed);
        graph.register("slow", slow, &[]).unwrap();
        graph.register("fast", fast, &[]).unwrap();
        graph.composite("build", &["slow", "fast"]).unwrap();

        let report = Scheduler::default().run(&graph, &["build"]).await.unwrap();

        let names: Vec<&str> = report.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["fast", "slow", "build"]);
    }

    #[tokio::test]
    async fn best_effort_runs_siblings_and_blocks_dependents() {
        let mut graph = TaskGraph::new();
        let (bad, _) = TestTask::new(Behaviour::Fail);
        let (good, good_runs) = TestTask::new(Behaviour::Succeed);
        graph.register("bad", bad, &[]).unwrap();
        graph.register("good", good, &[]).unwrap();
        graph.composite("build", &["bad", "good"]).unwrap();
        graph.composite("default", &["build"]).unwrap();

        let report = Scheduler::default().run(&graph, &["default"]).await.unwrap();

        assert!(!report.success());
        assert_eq!(good_runs.load(Ordering::SeqCst), 1);
        assert!(matches!(report.status("bad"), Some(TaskStatus::Failed { .. })));
        assert_eq!(
            report.status("build"),
            Some(&TaskStatus::Blocked {
                dependency: "bad".to_string()
            })
        );
        assert_eq!(
            report.status("default"),
            Some(&TaskStatus::Blocked {
                dependency: "build".to_string()
            })
        );
        assert_eq!(report.failures().count(), 3);
    }

    #[tokio::test]
    async fn fail_fast_cancels_in_flight_tasks() {
        let mut graph = TaskGraph::new();
        let (bad, _) = TestTask::new(Behaviour::Fail);
        let (slow, _) = TestTask::new(Behaviour::Sleep(Duration::from_secs(30)));
        graph.register("bad", bad, &[]).unwrap();
        graph.register("slow", slow, &[]).unwrap();
        graph.composite("build", &["bad", "slow"]).unwrap();

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            Scheduler::new(FailurePolicy::FailFast).run(&graph, &["build"]),
        )
        .await
        .expect("fail-fast did not abort the slow task")
        .unwrap();

        assert_eq!(report.status("slow"), Some(&TaskStatus::Cancelled));
        assert_eq!(report.status("build"), Some(&TaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let mut graph = TaskGraph::new();
        let (boom, _) = TestTask::new(Behaviour::Panic);
        graph.register("boom", boom, &[]).unwrap();

        let report = Scheduler::default().run(&graph, &["boom"]).await.unwrap();

        assert_eq!(
            report.status("boom"),
            Some(&TaskStatus::Failed {
                error: "Task panicked: task exploded".to_string()
            })
        );
    }

    /// Completes at once but panics when its future is dropped, outside the
    /// scheduler's unwind guard.
    struct PanicsOnDrop;

    impl std::future::Future for PanicsOnDrop {
        type Output = Result<TaskOutcome, TaskError>;

        fn poll(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Self::Output> {
            std::task::Poll::Ready(Ok(TaskOutcome::done()))
        }
    }

    impl Drop for PanicsOnDrop {
        fn drop(&mut self) {
            panic!("dropped badly");
        }
    }

    struct DropPanicTask;

    impl Task for DropPanicTask {
        fn description(&self) -> String {
            "drop panic".to_string()
        }

        fn run(self: Arc<Self>) -> TaskFuture {
            Box::pin(PanicsOnDrop)
        }
    }

    #[tokio::test]
    async fn escaped_panics_fail_the_task() {
        let mut graph = TaskGraph::new();
        graph.register("boom", DropPanicTask, &[]).unwrap();
        graph.composite("build", &["boom"]).unwrap();

        let report = Scheduler::default().run(&graph, &["build"]).await.unwrap();

        assert_eq!(
            report.status("boom"),
            Some(&TaskStatus::Failed {
                error: "Task panicked: dropped badly".to_string()
            })
        );
        assert_eq!(
            report.status("build"),
            Some(&TaskStatus::Blocked {
                dependency: "boom".to_string()
            })
        );
        assert_eq!(report.tasks.len(), 2);
    }

    #[tokio::test]
    async fn shared_dependencies_run_once() {
        let mut graph = TaskGraph::new();
        let (leaf, runs) = TestTask::new(Behaviour::Succeed);
        graph.register("leaf", leaf, &[]).unwrap();
        graph.composite("x", &["leaf"]).unwrap();
        graph.composite("y", &["leaf"]).unwrap();

        let report = Scheduler::default().run(&graph, &["x", "y"]).await.unwrap();

        assert!(report.success());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_targets_are_errors() {
        let graph = TaskGraph::new();

        let err = Scheduler::default().run(&graph, &["nope"]).await.unwrap_err();

        assert_eq!(err, GraphError::UnknownTask("nope".to_string()));
    }
}
