//! Named task graph.
//!
//! Edges point from a dependency to its dependent. Dependencies must be
//! registered before the tasks that use them, so the graph stays acyclic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;

use crate::error::GraphError;
use crate::task::{Composite, Task};

/// A registered task.
pub struct TaskNode {
    pub name: String,
    pub task: Arc<dyn Task>,
}

/// Directed acyclic graph of named tasks.
#[derive(Default)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, ()>,
    index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under `name`, depending on already registered tasks.
    pub fn register<T: Task>(
        &mut self,
        name: &str,
        task: T,
        dependencies: &[&str],
    ) -> Result<(), GraphError> {
        self.register_arc(name, Arc::new(task), dependencies)
    }

    /// Register a shared task.
    pub fn register_arc(
        &mut self,
        name: &str,
        task: Arc<dyn Task>,
        dependencies: &[&str],
    ) -> Result<(), GraphError> {
        if self.index.contains_key(name) {
            return Err(GraphError::DuplicateTask(name.to_string()));
        }

        let mut dep_indices = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            let idx = self
                .index
                .get(*dep)
                .ok_or_else(|| GraphError::UnknownDependency {
                    task: name.to_string(),
                    dependency: dep.to_string(),
                })?;
            dep_indices.push(*idx);
        }

        let node = self.graph.add_node(TaskNode {
            name: name.to_string(),
            task,
        });
        self.index.insert(name.to_string(), node);

        for dep in dep_indices {
            self.graph.update_edge(dep, node, ());
        }

        Ok(())
    }

    /// Register a composite task that runs `dependencies`.
    pub fn composite(&mut self, name: &str, dependencies: &[&str]) -> Result<(), GraphError> {
        self.register(name, Composite::new(dependencies), dependencies)
    }

    /// Whether a task is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Task names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].name.as_str())
            .collect()
    }

    /// Direct dependencies of a task, in registration order.
    pub fn dependencies(&self, name: &str) -> Option<Vec<&str>> {
        let idx = *self.index.get(name)?;
        Some(
            self.dependency_indices(idx)
                .into_iter()
                .map(|d| self.graph[d].name.as_str())
                .collect(),
        )
    }

    /// Description of a task.
    pub fn description(&self, name: &str) -> Option<String> {
        let idx = self.index.get(name)?;
        Some(self.graph[*idx].task.description())
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &TaskNode {
        &self.graph[idx]
    }

    pub(crate) fn dependency_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        deps.sort();
        deps
    }

    /// Targets plus everything they transitively depend on, in topological
    /// order.
    pub(crate) fn closure(&self, targets: &[&str]) -> Result<Vec<NodeIndex>, GraphError> {
        let reversed = Reversed(&self.graph);
        let mut members = HashSet::new();

        for target in targets {
            let start = *self
                .index
                .get(*target)
                .ok_or_else(|| GraphError::UnknownTask(target.to_string()))?;

            let mut dfs = Dfs::new(reversed, start);
            while let Some(idx) = dfs.next(reversed) {
                members.insert(idx);
            }
        }

        let order = toposort(&self.graph, None)
            .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].name.clone()))?;

        Ok(order
            .into_iter()
            .filter(|idx| members.contains(idx))
            .collect())
    }
}
