//! Glob patterns for selecting source files.
//!
//! Supports `*`, `**`, `?` and `{a,b}`. The literal directory prefix of a
//! pattern is its base; matched files keep their path relative to the base.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::TaskError;

/// A compiled glob pattern, relative to a project root.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    base: PathBuf,
    regex: Regex,
}

/// A file matched by a glob.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobMatch {
    /// Path relative to the glob base
    pub relative: PathBuf,

    /// Full path (root joined)
    pub path: PathBuf,
}

impl GlobPattern {
    /// Compile a pattern such as `src/**/*.scss`.
    pub fn new(pattern: &str) -> Result<Self, TaskError> {
        let glob_error = |message: String| TaskError::GlobError {
            pattern: pattern.to_string(),
            message,
        };

        let regex = to_regex(pattern)
            .and_then(|re| Regex::new(&re).map_err(|e| e.to_string()))
            .map_err(glob_error)?;

        Ok(Self {
            pattern: pattern.to_string(),
            base: literal_base(pattern),
            regex,
        })
    }

    /// The pattern text.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// The literal directory prefix.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether a root-relative path matches.
    pub fn is_match(&self, relative: &Path) -> bool {
        self.regex.is_match(&to_slash(relative))
    }

    /// All matching files under `root`, sorted by relative path.
    pub fn walk(&self, root: &Path) -> Vec<GlobMatch> {
        let base_dir = root.join(&self.base);
        if !base_dir.is_dir() {
            return Vec::new();
        }

        let mut matches: Vec<GlobMatch> = WalkDir::new(&base_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                let from_root = path.strip_prefix(root).ok()?;
                if !self.is_match(from_root) {
                    return None;
                }
                let relative = path.strip_prefix(&base_dir).ok()?.to_path_buf();
                Some(GlobMatch {
                    relative,
                    path: path.to_path_buf(),
                })
            })
            .collect();

        matches.sort();
        matches
    }
}

/// Directory components before the first wildcard.
fn literal_base(pattern: &str) -> PathBuf {
    let parts: Vec<&str> = pattern.split('/').collect();
    let wildcard = parts
        .iter()
        .position(|p| p.contains(['*', '?', '{', '[']))
        // A pattern without wildcards names a file; its base is the parent
        .unwrap_or(parts.len().saturating_sub(1));

    parts[..wildcard]
        .iter()
        .filter(|p| !p.is_empty() && **p != ".")
        .collect()
}

fn to_regex(pattern: &str) -> Result<String, String> {
    let pattern = pattern.trim_start_matches("./");
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    let mut in_group = false;

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '{' => {
                in_group = true;
                re.push_str("(?:");
            }
            ',' if in_group => re.push('|'),
            '}' if in_group => {
                in_group = false;
                re.push(')');
            }
            _ => re.push_str(&regex::escape(&c.to_string())),
        }
    }

    if in_group {
        return Err("unclosed `{`".to_string());
    }
    re.push('$');
    Ok(re)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn matches_recursive_patterns() {
        let glob = GlobPattern::new("src/**/*.scss").unwrap();

        assert_eq!(glob.base(), Path::new("src"));
        assert!(glob.is_match(Path::new("src/style.scss")));
        assert!(glob.is_match(Path::new("src/scss/deep/_vars.scss")));
        assert!(!glob.is_match(Path::new("src/style.css")));
        assert!(!glob.is_match(Path::new("lib/style.scss")));
    }

    #[test]
    fn matches_alternatives_and_single_chars() {
        let glob = GlobPattern::new("layout{,s}/**/*").unwrap();

        assert_eq!(glob.base(), Path::new(""));
        assert!(glob.is_match(Path::new("layout/index.html")));
        assert!(glob.is_match(Path::new("layouts/partials/nav.html")));
        assert!(!glob.is_match(Path::new("layoutz/index.html")));

        let single = GlobPattern::new("img/?.png").unwrap();
        assert!(single.is_match(Path::new("img/a.png")));
        assert!(!single.is_match(Path::new("img/ab.png")));
    }

    #[test]
    fn literal_patterns_use_parent_as_base() {
        let glob = GlobPattern::new("src/index.html").unwrap();

        assert_eq!(glob.base(), Path::new("src"));
        assert!(glob.is_match(Path::new("src/index.html")));
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert!(matches!(
            GlobPattern::new("src/{a,b"),
            Err(TaskError::GlobError { .. })
        ));
    }

    #[test]
    fn walks_matching_files_sorted() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/pages")).unwrap();
        fs::write(root.join("src/pages/b.html"), "").unwrap();
        fs::write(root.join("src/a.html"), "").unwrap();
        fs::write(root.join("src/notes.txt"), "").unwrap();

        let matches = GlobPattern::new("src/**/*.html").unwrap().walk(root);

        let relative: Vec<_> = matches.iter().map(|m| m.relative.clone()).collect();
        assert_eq!(
            relative,
            vec![PathBuf::from("a.html"), PathBuf::from("pages/b.html")]
        );
    }

    #[test]
    fn walking_missing_base_is_empty() {
        let temp = tempdir().unwrap();

        assert!(GlobPattern::new("content/**/*")
            .unwrap()
            .walk(temp.path())
            .is_empty());
    }
}
