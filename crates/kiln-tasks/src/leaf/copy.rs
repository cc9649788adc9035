//! File copy tasks.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::error::TaskError;
use crate::glob::GlobPattern;
use crate::leaf::{blocking, copy_file};
use crate::task::{Task, TaskFuture, TaskOutcome};

/// Copy `(from, to)` pairs in parallel, returning the written paths.
fn copy_all(pairs: Vec<(PathBuf, PathBuf)>) -> Result<Vec<PathBuf>, TaskError> {
    pairs
        .into_par_iter()
        .map(|(from, to)| copy_file(&from, &to).map(|()| to))
        .collect()
}

/// Copies HTML sources into the destination, keeping relative paths.
pub struct CopyHtml {
    config: Arc<BuildConfig>,
}

impl CopyHtml {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self { config }
    }

    fn copy(&self) -> Result<TaskOutcome, TaskError> {
        let glob = GlobPattern::new(&self.config.html.sources)?;
        let dest = self.config.dest_dir();

        let pairs: Vec<_> = glob
            .walk(&self.config.root)
            .into_iter()
            .map(|m| {
                let to = dest.join(&m.relative);
                (m.path, to)
            })
            .collect();

        if pairs.is_empty() {
            return Ok(TaskOutcome::Skipped {
                reason: format!("no files match {}", glob.as_str()),
            });
        }

        let outputs = copy_all(pairs)?;
        Ok(TaskOutcome::Completed { outputs })
    }
}

impl Task for CopyHtml {
    fn description(&self) -> String {
        format!(
            "Copy {} into {}",
            self.config.html.sources,
            self.config.dest.display()
        )
    }

    fn run(self: Arc<Self>) -> TaskFuture {
        Box::pin(blocking(move || self.copy()))
    }
}

/// Merges third-party font directories into the fonts target.
pub struct CopyFonts {
    config: Arc<BuildConfig>,
}

impl CopyFonts {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self { config }
    }

    fn target(&self) -> PathBuf {
        self.config.dest_dir().join(&self.config.fonts.target)
    }

    fn copy(&self) -> Result<TaskOutcome, TaskError> {
        let target = self.target();
        fs::create_dir_all(&target).map_err(|e| TaskError::WriteError {
            path: target.display().to_string(),
            message: e.to_string(),
        })?;

        // Keyed by destination so a file present in several directories is
        // copied once; later directories win.
        let mut pairs = BTreeMap::new();
        for dir in &self.config.fonts.dirs {
            let source = self.config.resolve(dir);
            if !source.is_dir() {
                tracing::warn!("Font directory {} not found", source.display());
                continue;
            }

            for entry in WalkDir::new(&source)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let relative = entry.path().strip_prefix(&source).unwrap_or(entry.path());
                let to = target.join(relative);
                if let Some(previous) = pairs.insert(to, entry.path().to_path_buf()) {
                    tracing::warn!(
                        "{} overrides {}",
                        entry.path().display(),
                        previous.display()
                    );
                }
            }
        }

        let outputs = copy_all(pairs.into_iter().map(|(to, from)| (from, to)).collect())?;
        Ok(TaskOutcome::Completed { outputs })
    }
}

impl Task for CopyFonts {
    fn description(&self) -> String {
        format!(
            "Copy font directories into {}",
            self.config.dest.join(&self.config.fonts.target).display()
        )
    }

    fn run(self: Arc<Self>) -> TaskFuture {
        Box::pin(blocking(move || self.copy()))
    }
}
