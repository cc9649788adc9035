//! Node-style module resolution.

use std::fs;
use std::path::{Path, PathBuf};

/// Resolves `require` specifiers to files.
#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Vec<String>,
}

impl Resolver {
    /// Create a resolver trying `extensions` (e.g. `".js"`) in order.
    /// `.json` is always tried last.
    pub fn new(extensions: &[String]) -> Self {
        let mut extensions: Vec<String> = extensions
            .iter()
            .map(|e| {
                if e.starts_with('.') {
                    e.clone()
                } else {
                    format!(".{}", e)
                }
            })
            .collect();
        if !extensions.iter().any(|e| e == ".json") {
            extensions.push(".json".to_string());
        }
        Self { extensions }
    }

    /// Resolve `specifier` as required from the file `from`.
    pub fn resolve(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        let dir = from.parent().unwrap_or(Path::new("."));

        let relative = specifier == "."
            || specifier == ".."
            || specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/');

        let resolved = if relative {
            let base = dir.join(specifier);
            self.resolve_file(&base)
                .or_else(|| self.resolve_directory(&base))
        } else {
            self.resolve_package(specifier, dir)
        };

        resolved.map(|p| fs::canonicalize(&p).unwrap_or(p))
    }

    fn resolve_file(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return Some(base.to_path_buf());
        }

        self.extensions.iter().find_map(|ext| {
            let mut candidate = base.as_os_str().to_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            candidate.is_file().then_some(candidate)
        })
    }

    fn resolve_directory(&self, dir: &Path) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }

        if let Some(main) = package_main(dir) {
            let target = dir.join(main);
            if let Some(found) = self
                .resolve_file(&target)
                .or_else(|| self.resolve_index(&target))
            {
                return Some(found);
            }
        }

        self.resolve_index(dir)
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.extensions.iter().find_map(|ext| {
            let candidate = dir.join(format!("index{}", ext));
            candidate.is_file().then_some(candidate)
        })
    }

    /// Look the package up in `node_modules`, walking towards the root.
    fn resolve_package(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        from_dir.ancestors().find_map(|ancestor| {
            let candidate = ancestor.join("node_modules").join(specifier);
            self.resolve_file(&candidate)
                .or_else(|| self.resolve_directory(&candidate))
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&[".js".to_string(), ".jsx".to_string()])
    }
}

/// The `main` field of a directory's package.json.
fn package_main(dir: &Path) -> Option<String> {
    let content = fs::read_to_string(dir.join("package.json")).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&content).ok()?;
    manifest
        .get("main")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolves_extensions_and_index_files() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("lib/widgets")).unwrap();
        fs::write(root.join("index.js"), "").unwrap();
        fs::write(root.join("lib/util.jsx"), "").unwrap();
        fs::write(root.join("lib/widgets/index.js"), "").unwrap();

        let resolver = Resolver::default();
        let from = root.join("index.js");

        let util = resolver.resolve("./lib/util", &from).unwrap();
        assert!(util.ends_with("lib/util.jsx"));

        let widgets = resolver.resolve("./lib/widgets", &from).unwrap();
        assert!(widgets.ends_with("lib/widgets/index.js"));

        assert!(resolver.resolve("./lib/missing", &from).is_none());
    }

    #[test]
    fn resolves_packages_through_main() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let pkg = root.join("node_modules/tiny");
        fs::create_dir_all(pkg.join("dist")).unwrap();
        fs::create_dir_all(root.join("src/deep")).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main": "dist/tiny"}"#).unwrap();
        fs::write(pkg.join("dist/tiny.js"), "").unwrap();

        let resolved = Resolver::default()
            .resolve("tiny", &root.join("src/deep/app.js"))
            .unwrap();

        assert!(resolved.ends_with("node_modules/tiny/dist/tiny.js"));
    }

    #[test]
    fn always_tries_json() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("data.json"), "{}").unwrap();

        let resolver = Resolver::new(&["js".to_string()]);
        let resolved = resolver.resolve("./data", &temp.path().join("index.js"));

        assert!(resolved.is_some());
    }
}
