//! Initialize kiln in a project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Write `config_path` and a starter `src/` tree next to it.
///
/// Existing files are kept unless `yes` is set.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing kiln...");

    let root = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let files = [
        (config_path.to_path_buf(), DEFAULT_CONFIG),
        (root.join("src/index.html"), DEFAULT_HTML),
        (root.join("src/index.js"), DEFAULT_SCRIPT),
        (root.join("src/scss/style.scss"), DEFAULT_STYLE),
        (root.join("src/scss/_variables.scss"), DEFAULT_VARIABLES),
    ];

    for (path, contents) in files {
        if path.exists() && !yes {
            tracing::warn!("{} already exists. Use --yes to overwrite.", path.display());
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Created {}", path.display());
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'kiln serve' to start the development server.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# kiln configuration

[site]
# Project root, relative to this file
root = "."

# Build output directory
dest = "public"

[generator]
# Static site generator run by the generate-site task
command = "hugo"
args = []
enabled = true

[styles]
sources = "src/**/*.scss"
minify = false

[scripts]
entry = "src/index.js"
output = "bundle.js"
# Append an inline source map
debug = true

[html]
sources = "src/**/*.html"

[fonts]
dirs = [
    "node_modules/font-awesome/fonts",
    "node_modules/bootstrap-sass/assets/fonts/bootstrap",
]
target = "fonts"

[build]
# Stop at the first failing task
fail_fast = false

[serve]
port = 3000
open = true
"#;

const DEFAULT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>My Site</title>
  <link rel="stylesheet" href="/scss/style.css">
</head>
<body>
  <h1>Hello from kiln</h1>
  <script src="/bundle.js"></script>
</body>
</html>
"#;

const DEFAULT_SCRIPT: &str = r#"var greet = function (name) {
  return 'Hello, ' + name;
};

console.log(greet('kiln'));
"#;

const DEFAULT_STYLE: &str = r#"@import 'variables';

body {
  font-family: $font-stack;
  color: $text;

  h1 {
    color: $brand;
  }
}
"#;

const DEFAULT_VARIABLES: &str = r#"$font-stack: system-ui, sans-serif;
$text: #222;
$brand: #c0392b;
"#;
