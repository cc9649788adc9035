//! List registered tasks.

use anyhow::{Context, Result};
use kiln_tasks::TaskGraph;

use crate::config::Project;

/// Print every task with its dependencies and description.
pub fn run(project: &Project) -> Result<()> {
    let graph = project.graph()?;
    print!("{}", render(&graph)?);
    Ok(())
}

fn render(graph: &TaskGraph) -> Result<String> {
    let mut out = String::new();

    for name in graph.names() {
        let deps = graph
            .dependencies(name)
            .with_context(|| format!("Unknown task: {}", name))?;
        let description = graph.description(name).unwrap_or_default();

        out.push_str(&format!("{:<16} {}\n", name, description));
        if !deps.is_empty() {
            out.push_str(&format!("{:<16} depends on: {}\n", "", deps.join(", ")));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tasks_with_dependencies() {
        let mut graph = TaskGraph::new();
        graph.composite("a", &[]).unwrap();
        graph.composite("all", &["a"]).unwrap();

        let out = render(&graph).unwrap();

        assert_eq!(
            out,
            format!(
                "{:<16} Run \n{:<16} Run a\n{:<16} depends on: a\n",
                "a", "all", ""
            )
        );
    }
}
