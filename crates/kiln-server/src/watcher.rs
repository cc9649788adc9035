//! File watching for rebuilds.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use kiln_tasks::GlobPattern;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Decides which changed paths should trigger a rebuild.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    patterns: Vec<GlobPattern>,
    ignore: PathBuf,
}

impl WatchFilter {
    /// Build a filter for `patterns` relative to `root`. Paths under
    /// `ignore` (the build output, relative to the root) never match.
    pub fn new(root: &Path, patterns: Vec<GlobPattern>, ignore: &Path) -> Self {
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let ignore = root.join(ignore);
        Self {
            root,
            patterns,
            ignore,
        }
    }

    /// Directories to watch: the existing base directory of each pattern.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let dirs: BTreeSet<PathBuf> = self
            .patterns
            .iter()
            .map(|p| self.root.join(p.base()))
            .filter(|dir| dir.is_dir())
            .collect();
        dirs.into_iter().collect()
    }

    /// Whether a change at `path` should trigger a rebuild.
    pub fn matches(&self, path: &Path) -> bool {
        if path.starts_with(&self.ignore) {
            return false;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        self.patterns.iter().any(|p| p.is_match(relative))
    }
}

/// File watcher forwarding matching changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch the base directories of `filter` recursively.
    ///
    /// Returns the watcher and a channel of changed paths that pass the
    /// filter. Dropping the watcher stops the events.
    pub fn new(filter: WatchFilter) -> Result<(Self, async_mpsc::Receiver<PathBuf>), notify::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })?;

        let dirs = filter.watch_dirs();
        if dirs.is_empty() {
            tracing::warn!("No watch directories exist under {}", filter.root.display());
        }
        for dir in &dirs {
            tracing::debug!("Watching {}", dir.display());
            watcher.watch(dir, RecursiveMode::Recursive)?;
        }

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                if !is_change(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if filter.matches(&path) && async_tx.blocking_send(path).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn filter(root: &Path) -> WatchFilter {
        let patterns = ["content/**/*", "src/**/*", "static/**/*"]
            .iter()
            .map(|p| GlobPattern::new(p).unwrap())
            .collect();
        WatchFilter::new(root, patterns, Path::new("public"))
    }

    #[test]
    fn filters_by_glob_and_ignores_output() {
        let temp = tempdir().unwrap();
        let filter = filter(temp.path());
        let root = fs::canonicalize(temp.path()).unwrap();

        assert!(filter.matches(&root.join("src/scss/style.scss")));
        assert!(filter.matches(&root.join("content/post.md")));
        assert!(!filter.matches(&root.join("public/bundle.js")));
        assert!(!filter.matches(&root.join("node_modules/x/index.js")));
        assert!(!filter.matches(Path::new("/elsewhere/src/a.js")));
    }

    #[test]
    fn watches_only_existing_bases() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();

        assert_eq!(filter(temp.path()).watch_dirs(), vec![root.join("src")]);
    }

    #[test]
    fn ignore_applies_even_when_globs_cover_it() {
        let temp = tempdir().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let filter = WatchFilter::new(
            temp.path(),
            vec![GlobPattern::new("**/*").unwrap()],
            Path::new("public"),
        );

        assert!(filter.matches(&root.join("src/index.js")));
        assert!(!filter.matches(&root.join("public/index.html")));
    }

    #[tokio::test]
    async fn forwards_matching_changes() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let (watcher, mut rx) = FileWatcher::new(filter(temp.path())).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(temp.path().join("src/index.js"), "// changed").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        drop(watcher);

        let path = event
            .expect("timeout waiting for file watch event")
            .expect("channel should not be closed");
        assert!(path.ends_with("src/index.js"));
    }
}
