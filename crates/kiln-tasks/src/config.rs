//! Build configuration shared by every task.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration injected into each task at registration time.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root; relative paths are resolved against it
    pub root: PathBuf,

    /// Destination directory, relative to the root
    pub dest: PathBuf,

    pub generator: GeneratorConfig,
    pub styles: StylesConfig,
    pub scripts: ScriptsConfig,
    pub html: HtmlConfig,
    pub fonts: FontsConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dest: PathBuf::from("public"),
            generator: GeneratorConfig::default(),
            styles: StylesConfig::default(),
            scripts: ScriptsConfig::default(),
            html: HtmlConfig::default(),
            fonts: FontsConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Absolute-or-root-relative destination directory.
    pub fn dest_dir(&self) -> PathBuf {
        self.root.join(&self.dest)
    }

    /// Resolve a project path against the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

/// External site generator invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Skip the generator entirely when false
    pub enabled: bool,

    /// Program to run
    pub command: String,

    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "hugo".to_string(),
            args: Vec::new(),
        }
    }
}

/// Stylesheet compilation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    /// Glob selecting style sources
    pub sources: String,

    /// Minify compiled CSS
    pub minify: bool,

    /// Extra import search directories
    pub load_paths: Vec<PathBuf>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            sources: "src/**/*.scss".to_string(),
            minify: false,
            load_paths: Vec::new(),
        }
    }
}

/// Script bundling settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Entry script
    pub entry: PathBuf,

    /// Bundle file name inside the destination
    pub output: String,

    /// Extensions tried when resolving `require`
    pub extensions: Vec<String>,

    /// Strip non-legal comments
    pub minify: bool,

    /// Append an inline source map
    pub debug: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            entry: PathBuf::from("src/index.js"),
            output: "bundle.js".to_string(),
            extensions: vec![".js".to_string(), ".jsx".to_string()],
            minify: false,
            debug: true,
        }
    }
}

/// HTML copy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    /// Glob selecting HTML files
    pub sources: String,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            sources: "src/**/*.html".to_string(),
        }
    }
}

/// Font copy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FontsConfig {
    /// Third-party font directories merged into the target
    pub dirs: Vec<PathBuf>,

    /// Subdirectory of the destination receiving the fonts
    pub target: String,
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self {
            dirs: vec![
                PathBuf::from("node_modules/font-awesome/fonts"),
                PathBuf::from("node_modules/bootstrap-sass/assets/fonts/bootstrap"),
            ],
            target: "fonts".to_string(),
        }
    }
}
