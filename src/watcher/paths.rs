//! Canonical watched path set and watch directory computation.
//!
//! Events are matched against the set by exact canonical path equality.
//! Parent directories are what actually get registered with the notifier,
//! so a file replaced by rename keeps producing events.

use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` to an absolute, cleaned path.
///
/// Existing paths are fully canonicalized. For a missing file the parent
/// directory is canonicalized and the file name re-attached, so the result
/// still equals the path the notifier reports once the file appears.
pub fn canonical_path(path: &Path) -> io::Result<PathBuf> {
    if let Ok(p) = std::fs::canonicalize(path) {
        return Ok(p);
    }

    let clean = clean_path(&std::path::absolute(path)?);
    match (clean.parent(), clean.file_name()) {
        (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
            Ok(dir) => Ok(dir.join(name)),
            Err(_) => Ok(clean),
        },
        _ => Ok(clean),
    }
}

/// Lexically remove `.` and `..` components.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Ordered set of canonical file paths observed by one watcher.
#[derive(Debug, Default, Clone)]
pub struct WatchedPathSet {
    /// Canonical paths in first-seen order.
    paths: Vec<PathBuf>,
    /// Parent dirs of tracked files.
    watch_dirs: BTreeSet<PathBuf>,
}

impl WatchedPathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize and collect `paths`, dropping duplicates.
    pub fn from_paths<P: AsRef<Path>>(
        paths: impl IntoIterator<Item = P>,
    ) -> io::Result<Self> {
        let mut set = Self::new();
        for path in paths {
            set.insert(canonical_path(path.as_ref())?);
        }
        Ok(set)
    }

    /// Insert an already canonical path. Returns false if it was present.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if self.contains(&path) {
            return false;
        }
        if let Some(parent) = path.parent() {
            self.watch_dirs.insert(parent.to_path_buf());
        }
        self.paths.push(path);
        true
    }

    /// Exact canonical-path membership.
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn watch_dirs(&self) -> impl Iterator<Item = &Path> {
        self.watch_dirs.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn dir_count(&self) -> usize {
        self.watch_dirs.len()
    }
}
