//! Stylesheet compilation task.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_styles::{is_partial, StyleCompiler, StyleOptions};
use rayon::prelude::*;

use crate::config::BuildConfig;
use crate::error::TaskError;
use crate::glob::GlobPattern;
use crate::leaf::{blocking, write_output};
use crate::task::{Task, TaskFuture, TaskOutcome};

/// Compiles every non-partial stylesheet matched by the sources glob.
///
/// Each file compiles independently. A broken file is logged and does not
/// stop the others from being written, but the task still fails.
pub struct CompileStyles {
    config: Arc<BuildConfig>,
}

impl CompileStyles {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self { config }
    }

    fn compile_all(&self) -> Result<TaskOutcome, TaskError> {
        let config = &self.config;
        let glob = GlobPattern::new(&config.styles.sources)?;

        let sources: Vec<_> = glob
            .walk(&config.root)
            .into_iter()
            .filter(|m| !is_partial(&m.path))
            .collect();

        if sources.is_empty() {
            return Ok(TaskOutcome::Skipped {
                reason: format!("no stylesheets match {}", glob.as_str()),
            });
        }

        let compiler = StyleCompiler::new(StyleOptions {
            minify: config.styles.minify,
            load_paths: config
                .styles
                .load_paths
                .iter()
                .map(|p| config.resolve(p))
                .collect(),
        });
        let dest = config.dest_dir();

        let results: Vec<Result<PathBuf, String>> = sources
            .par_iter()
            .map(|source| {
                let css = compiler
                    .compile_file(&source.path)
                    .map_err(|e| e.to_string())?;
                let output = dest.join(&source.relative).with_extension("css");
                write_output(&output, css).map_err(|e| e.to_string())?;
                Ok(output)
            })
            .collect();

        let mut outputs = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(message) => {
                    tracing::error!("{}", message);
                    errors.push(message);
                }
            }
        }

        if let Some(first) = errors.first() {
            return Err(TaskError::StylesFailed {
                failed: errors.len(),
                first: first.clone(),
            });
        }

        Ok(TaskOutcome::Completed { outputs })
    }
}

impl Task for CompileStyles {
    fn description(&self) -> String {
        format!(
            "Compile {} into {}",
            self.config.styles.sources,
            self.config.dest.display()
        )
    }

    fn run(self: Arc<Self>) -> TaskFuture {
        Box::pin(blocking(move || self.compile_all()))
    }
}
