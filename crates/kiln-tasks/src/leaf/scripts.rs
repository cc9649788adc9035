//! Script bundling task.

use std::sync::Arc;

use kiln_bundle::{BundleOptions, Bundler};

use crate::config::BuildConfig;
use crate::error::TaskError;
use crate::leaf::{blocking, write_output};
use crate::task::{Task, TaskFuture, TaskOutcome};

/// Bundles the entry script and everything it requires into one file.
pub struct BundleScripts {
    config: Arc<BuildConfig>,
}

impl BundleScripts {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self { config }
    }

    fn bundle(&self) -> Result<TaskOutcome, TaskError> {
        let config = &self.config;
        let entry = config.resolve(&config.scripts.entry);

        if !entry.is_file() {
            tracing::warn!("Entry script {} not found", entry.display());
            return Ok(TaskOutcome::Skipped {
                reason: format!("{} does not exist", config.scripts.entry.display()),
            });
        }

        let bundler = Bundler::new(BundleOptions {
            extensions: config.scripts.extensions.clone(),
            minify: config.scripts.minify,
            debug: config.scripts.debug,
        });
        let bundle = bundler.bundle(&entry)?;
        tracing::debug!("Bundled {} modules", bundle.modules.len());

        let output = config.dest_dir().join(&config.scripts.output);
        write_output(&output, bundle.code)?;

        Ok(TaskOutcome::Completed {
            outputs: vec![output],
        })
    }
}

impl Task for BundleScripts {
    fn description(&self) -> String {
        format!(
            "Bundle {} into {}",
            self.config.scripts.entry.display(),
            self.config.dest.join(&self.config.scripts.output).display()
        )
    }

    fn run(self: Arc<Self>) -> TaskFuture {
        Box::pin(blocking(move || self.bundle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bundle::BundleError;
    use std::fs;
    use tempfile::tempdir;

    fn task(root: &std::path::Path) -> Arc<BundleScripts> {
        let config = BuildConfig {
            root: root.to_path_buf(),
            ..BuildConfig::default()
        };
        Arc::new(BundleScripts::new(Arc::new(config)))
    }

    #[tokio::test]
    async fn writes_bundle_to_destination() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/index.js"), "var nav = require('./nav');\nnav();\n").unwrap();
        fs::write(root.join("src/nav.jsx"), "module.exports = function () {};\n").unwrap();

        let outcome = task(root).run().await.unwrap();

        let output = root.join("public/bundle.js");
        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                outputs: vec![output.clone()]
            }
        );
        let code = fs::read_to_string(output).unwrap();
        assert!(code.contains("require('./nav')"));
        assert!(code.contains("\"./nav\":1"));
        assert!(code.contains("//# sourceMappingURL=data:application/json"));
    }

    #[tokio::test]
    async fn missing_entry_is_skipped() {
        let temp = tempdir().unwrap();

        let outcome = task(temp.path()).run().await.unwrap();

        assert!(matches!(outcome, TaskOutcome::Skipped { .. }));
        assert!(!temp.path().join("public/bundle.js").exists());
    }

    #[tokio::test]
    async fn unresolved_require_fails_without_output() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/index.js"), "require('./missing');\n").unwrap();

        let err = task(root).run().await.unwrap_err();

        assert!(matches!(
            err,
            TaskError::Bundle(BundleError::ResolveError { ref specifier, .. }) if specifier == "./missing"
        ));
        assert!(!root.join("public/bundle.js").exists());
    }
}
