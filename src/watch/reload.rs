// src/watch/reload.rs

//! Which entities a changed script file belongs to, and whether its content
//! actually changed since it was last applied.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::fs::FileSystem;

/// A script file whose content changed, with every entity that uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptChange {
    pub path: PathBuf,
    pub entity_ids: Vec<String>,
    pub source: String,
}

/// Index of watched script files.
///
/// Several entities may share one file. The last applied text per file is
/// remembered so that editor saves which don't change anything are ignored.
#[derive(Debug, Default)]
pub struct ScriptIndex {
    by_path: HashMap<PathBuf, Vec<String>>,
    applied: HashMap<PathBuf, String>,
}

impl ScriptIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, entity_id: impl Into<String>) {
        let ids = self.by_path.entry(path.into()).or_default();
        let entity_id = entity_id.into();
        if !ids.contains(&entity_id) {
            ids.push(entity_id);
        }
    }

    /// Record `text` as already applied for `path`.
    pub fn seed(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.applied.insert(path.into(), text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.by_path.keys().map(PathBuf::as_path)
    }

    /// Directories to watch. Editors commonly replace files by rename, so the
    /// parent directory is watched rather than the file itself.
    pub fn watched_dirs(&self) -> BTreeSet<PathBuf> {
        self.by_path
            .keys()
            .map(|p| match p.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            })
            .collect()
    }

    /// Re-read `path` and report the change, if any.
    ///
    /// Returns `Ok(None)` for paths outside the index and for content equal
    /// to what was last applied.
    pub fn reload(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<Option<ScriptChange>> {
        let Some(ids) = self.by_path.get(path) else {
            return Ok(None);
        };
        let text = fs.read_to_string(path)?;
        if self.applied.get(path) == Some(&text) {
            debug!(?path, "script file unchanged");
            return Ok(None);
        }

        let change = ScriptChange {
            path: path.to_path_buf(),
            entity_ids: ids.clone(),
            source: text.clone(),
        };
        self.applied.insert(path.to_path_buf(), text);
        Ok(Some(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn reports_each_distinct_edit_once() {
        let fs = MockFileSystem::new();
        fs.add_file("scripts/a.js", "return 1");

        let mut index = ScriptIndex::new();
        index.insert("scripts/a.js", "kitchen");
        index.insert("scripts/a.js", "hallway");
        index.insert("scripts/a.js", "kitchen");
        index.seed("scripts/a.js", "return 1");

        let path = Path::new("scripts/a.js");
        assert_eq!(index.reload(&fs, path).unwrap(), None);

        fs.add_file("scripts/a.js", "return 2");
        let change = index.reload(&fs, path).unwrap().unwrap();
        assert_eq!(change.entity_ids, vec!["kitchen", "hallway"]);
        assert_eq!(change.source, "return 2");

        assert_eq!(index.reload(&fs, path).unwrap(), None);
    }

    #[test]
    fn ignores_unwatched_paths_and_surfaces_read_errors() {
        let fs = MockFileSystem::new();
        let mut index = ScriptIndex::new();
        index.insert("scripts/gone.js", "porch");

        assert_eq!(index.reload(&fs, Path::new("notes.txt")).unwrap(), None);
        assert!(index.reload(&fs, Path::new("scripts/gone.js")).is_err());
    }

    #[test]
    fn watches_parent_directories() {
        let mut index = ScriptIndex::new();
        index.insert("/srv/scripts/a.js", "a");
        index.insert("/srv/scripts/b.js", "b");
        index.insert("c.js", "c");

        let dirs = index.watched_dirs();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.contains(Path::new("/srv/scripts")));
        assert!(dirs.contains(Path::new(".")));
    }
}
