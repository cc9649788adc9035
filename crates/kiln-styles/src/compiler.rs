//! Stylesheet compilation entry point.

use std::fs;
use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};

use crate::error::StyleError;
use crate::eval::{evaluate, serialize};
use crate::parser::{parse, Node};

/// Options for compiling stylesheets.
#[derive(Debug, Clone, Default)]
pub struct StyleOptions {
    /// Minify the printed CSS
    pub minify: bool,

    /// Extra directories searched for imports
    pub load_paths: Vec<PathBuf>,
}

/// Compiles SCSS-subset sources to plain CSS.
#[derive(Debug, Clone, Default)]
pub struct StyleCompiler {
    options: StyleOptions,
}

/// Whether a stylesheet is a partial (only compiled through imports).
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

impl StyleCompiler {
    /// Create a new compiler.
    pub fn new(options: StyleOptions) -> Self {
        Self { options }
    }

    /// Compile a stylesheet file.
    pub fn compile_file(&self, path: &Path) -> Result<String, StyleError> {
        let source = read_source(path)?;
        self.compile_str(&source, path)
    }

    /// Compile stylesheet source. `path` anchors relative imports and errors.
    pub fn compile_str(&self, source: &str, path: &Path) -> Result<String, StyleError> {
        let nodes = parse(source, path)?;

        let mut stack = vec![canonical(path)];
        let nodes = self.expand_imports(nodes, base_dir(path), &mut stack)?;

        let items = evaluate(&nodes)?;
        self.print(&serialize(&items), path)
    }

    /// Validate and print flat CSS with lightningcss.
    fn print(&self, css: &str, path: &Path) -> Result<String, StyleError> {
        let css_error = |message: String| StyleError::CssError {
            path: path.display().to_string(),
            message,
        };

        let stylesheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: path.display().to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| css_error(e.to_string()))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: self.options.minify,
                ..Default::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        Ok(printed.code)
    }

    /// Inline local imports recursively.
    fn expand_imports(
        &self,
        nodes: Vec<Node>,
        dir: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Vec<Node>, StyleError> {
        let mut out = Vec::with_capacity(nodes.len());

        for node in nodes {
            match node {
                Node::Import { targets, origin } => {
                    for target in targets {
                        if is_plain_css_import(&target) {
                            out.push(Node::AtRule {
                                name: "import".to_string(),
                                prelude: target,
                                block: None,
                                origin: origin.clone(),
                            });
                            continue;
                        }

                        let name = unquote(&target);
                        let resolved =
                            self.resolve_import(name, dir)
                                .ok_or_else(|| StyleError::ImportNotFound {
                                    path: origin.file.display().to_string(),
                                    line: origin.line,
                                    target: name.to_string(),
                                })?;

                        let key = canonical(&resolved);
                        if stack.contains(&key) {
                            let chain = stack
                                .iter()
                                .chain(std::iter::once(&key))
                                .map(|p| p.display().to_string())
                                .collect::<Vec<_>>()
                                .join(" -> ");
                            return Err(StyleError::ImportCycle(chain));
                        }

                        let source = read_source(&resolved)?;
                        let parsed = parse(&source, &resolved)?;

                        stack.push(key);
                        let expanded = self.expand_imports(parsed, base_dir(&resolved), stack);
                        stack.pop();
                        out.extend(expanded?);
                    }
                }
                Node::Rule {
                    selector,
                    children,
                    origin,
                } => out.push(Node::Rule {
                    selector,
                    children: self.expand_imports(children, dir, stack)?,
                    origin,
                }),
                Node::AtRule {
                    name,
                    prelude,
                    block: Some(children),
                    origin,
                } => out.push(Node::AtRule {
                    name,
                    prelude,
                    block: Some(self.expand_imports(children, dir, stack)?),
                    origin,
                }),
                Node::Mixin {
                    name,
                    params,
                    body,
                    origin,
                } => out.push(Node::Mixin {
                    name,
                    params,
                    body: self.expand_imports(body, dir, stack)?,
                    origin,
                }),
                other => out.push(other),
            }
        }

        Ok(out)
    }

    /// Find the file an import refers to.
    fn resolve_import(&self, name: &str, dir: &Path) -> Option<PathBuf> {
        std::iter::once(dir)
            .chain(self.options.load_paths.iter().map(PathBuf::as_path))
            .flat_map(|base| import_candidates(base, name))
            .find(|candidate| candidate.is_file())
    }
}

/// Candidate files for `@import "name"`, in lookup order.
fn import_candidates(base: &Path, name: &str) -> Vec<PathBuf> {
    let target = base.join(name);
    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    if name.ends_with(".scss") {
        return vec![target, parent.join(format!("_{}", file_name))];
    }

    vec![
        parent.join(format!("{}.scss", file_name)),
        parent.join(format!("_{}.scss", file_name)),
        target.join("_index.scss"),
        target.join("index.scss"),
    ]
}

fn is_plain_css_import(target: &str) -> bool {
    let quoted = target.starts_with(['"', '\'']);
    let name = unquote(target);
    !quoted
        || name.ends_with(".css")
        || name.starts_with("http://")
        || name.starts_with("https://")
        || name.starts_with("//")
}

fn unquote(value: &str) -> &str {
    value
        .trim()
        .trim_start_matches(['"', '\''])
        .trim_end_matches(['"', '\''])
}

fn read_source(path: &Path) -> Result<String, StyleError> {
    fs::read_to_string(path).map_err(|e| StyleError::ReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new("."))
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn compiles_partial_imports() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("scss");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("_vars.scss"), "$pad: 12px;\n").unwrap();
        fs::write(
            dir.join("style.scss"),
            "@import 'vars';\n.box {\n  padding: $pad;\n  .inner { width: 10px; }\n}\n",
        )
        .unwrap();

        let css = StyleCompiler::default()
            .compile_file(&dir.join("style.scss"))
            .unwrap();

        assert!(css.contains(".box {"));
        assert!(css.contains("padding: 12px"));
        assert!(css.contains(".box .inner {"));
        assert!(!css.contains('$'));
    }

    #[test]
    fn keeps_plain_css_imports() {
        let css = StyleCompiler::default()
            .compile_str(
                "@import url(theme.css);\n.a { width: 1px; }",
                Path::new("style.scss"),
            )
            .unwrap();

        assert!(css.contains("@import"));
        assert!(css.contains("theme.css"));
    }

    #[test]
    fn searches_load_paths() {
        let temp = tempdir().unwrap();
        let vendor = temp.path().join("vendor");
        fs::create_dir_all(vendor.join("grid")).unwrap();
        fs::write(vendor.join("grid/_index.scss"), ".row { width: 100%; }").unwrap();

        let compiler = StyleCompiler::new(StyleOptions {
            load_paths: vec![vendor],
            ..Default::default()
        });
        let css = compiler
            .compile_str("@use 'grid';", &temp.path().join("style.scss"))
            .unwrap();

        assert!(css.contains(".row"));
    }

    #[test]
    fn reports_missing_imports() {
        let temp = tempdir().unwrap();
        let err = StyleCompiler::default()
            .compile_str("\n@import 'nope';", &temp.path().join("style.scss"))
            .unwrap_err();

        assert!(matches!(
            err,
            StyleError::ImportNotFound { line: 2, ref target, .. } if target == "nope"
        ));
    }

    #[test]
    fn detects_import_cycles() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("_a.scss"), "@import 'b';").unwrap();
        fs::write(temp.path().join("_b.scss"), "@import 'a';").unwrap();
        fs::write(temp.path().join("main.scss"), "@import 'a';").unwrap();

        let err = StyleCompiler::default()
            .compile_file(&temp.path().join("main.scss"))
            .unwrap_err();

        assert!(matches!(err, StyleError::ImportCycle(_)));
    }

    #[test]
    fn minifies_output() {
        let compiler = StyleCompiler::new(StyleOptions {
            minify: true,
            ..Default::default()
        });
        let css = compiler
            .compile_str(
                ".button {\n  padding: 10px;\n  span { width: 1px; }\n}\n",
                Path::new("style.scss"),
            )
            .unwrap();

        assert!(!css.contains('\n'));
        assert!(css.contains(".button span"));
    }

    #[test]
    fn output_is_deterministic() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("style.scss");
        fs::write(&path, "$w: 3px;\n.a { width: $w; .b { width: $w; } }\n").unwrap();

        let compiler = StyleCompiler::default();
        let first = compiler.compile_file(&path).unwrap();
        let second = compiler.compile_file(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn reports_invalid_css() {
        let err = StyleCompiler::default()
            .compile_str(".a { width: 1px; } }", Path::new("style.scss"))
            .unwrap_err();

        assert!(matches!(err, StyleError::SyntaxError { .. }));
    }

    #[test]
    fn detects_partials() {
        assert!(is_partial(Path::new("src/scss/_vars.scss")));
        assert!(!is_partial(Path::new("src/scss/style.scss")));
    }
}
