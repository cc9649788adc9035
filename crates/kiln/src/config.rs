//! Project configuration (kiln.toml).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kiln_server::DevServerConfig;
use kiln_tasks::{
    standard_graph, BuildConfig, FailurePolicy, FontsConfig, GeneratorConfig, HtmlConfig,
    ScriptsConfig, StylesConfig, TaskGraph,
};
use serde::Deserialize;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    site: SiteSection,
    generator: GeneratorConfig,
    styles: StylesConfig,
    scripts: ScriptsConfig,
    html: HtmlConfig,
    fonts: FontsConfig,
    build: BuildSection,
    serve: ServeSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SiteSection {
    root: PathBuf,
    dest: PathBuf,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dest: PathBuf::from("public"),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildSection {
    fail_fast: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ServeSection {
    host: Option<String>,
    port: Option<u16>,
    open: Option<bool>,
    watch: Option<Vec<String>>,
    debounce_ms: Option<u64>,
}

/// A loaded project: its configuration plus the directory it lives in.
#[derive(Debug)]
pub struct Project {
    file: ConfigFile,
    root: PathBuf,
}

impl Project {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            tracing::debug!("Loaded config from {}", path.display());
            file
        } else {
            tracing::debug!("No {} found, using defaults", path.display());
            ConfigFile::default()
        };

        // Relative roots are relative to the config file
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let root = dir.join(&file.site.root);

        Ok(Self { file, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings handed to every build task.
    pub fn build_config(&self) -> BuildConfig {
        BuildConfig {
            root: self.root.clone(),
            dest: self.file.site.dest.clone(),
            generator: self.file.generator.clone(),
            styles: self.file.styles.clone(),
            scripts: self.file.scripts.clone(),
            html: self.file.html.clone(),
            fonts: self.file.fonts.clone(),
        }
    }

    /// The standard task graph for this project.
    pub fn graph(&self) -> Result<TaskGraph> {
        standard_graph(Arc::new(self.build_config())).context("Failed to register tasks")
    }

    /// Failure policy; the `--fail-fast` flag wins over the file.
    pub fn policy(&self, fail_fast: bool) -> FailurePolicy {
        if fail_fast || self.file.build.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::BestEffort
        }
    }

    /// Dev server settings, with command line overrides applied.
    pub fn server_config(&self, port: Option<u16>, no_open: bool) -> DevServerConfig {
        let defaults = DevServerConfig::default();
        let serve = &self.file.serve;

        DevServerConfig {
            root: self.root.clone(),
            dest: self.file.site.dest.clone(),
            host: serve.host.clone().unwrap_or(defaults.host),
            port: port.or(serve.port).unwrap_or(defaults.port),
            open: !no_open && serve.open.unwrap_or(defaults.open),
            watch: serve.watch.clone().unwrap_or(defaults.watch),
            debounce: serve
                .debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
        }
    }
}
