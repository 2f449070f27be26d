//! VirtualFileStore: the flat `path -> FileRecord` map that is the single
//! source of truth for project content.
//!
//! Folders are never stored. A folder exists because some key is nested
//! under it; an empty folder is kept alive by a `.keep` marker. All
//! operations are synchronous and either succeed completely or leave the
//! store untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;

use super::path::VfsPath;
use super::tree::tree_order;
use super::types::{FileRecord, FileType};
use crate::error::{Error, Result};

/// Plain mapping of every record in a store, markers included.
pub type FileMap = BTreeMap<VfsPath, FileRecord>;

/// In-memory project file store.
#[derive(Debug, Clone, Default)]
pub struct VirtualFileStore {
    files: FileMap,
    /// Last timestamp handed out; keeps `last_modified` strictly increasing.
    clock: Option<DateTime<Utc>>,
}

impl VirtualFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding `files`.
    pub fn from_files(files: FileMap) -> Self {
        let mut store = Self::new();
        store.replace_all(files);
        store
    }

    // -- queries --

    pub fn get(&self, path: &VfsPath) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// True if a file (or marker) is stored exactly at `path`.
    pub fn contains(&self, path: &VfsPath) -> bool {
        self.files.contains_key(path)
    }

    /// True if any key, markers included, is nested under `folder`.
    pub fn folder_exists(&self, folder: &VfsPath) -> bool {
        self.nested_keys(folder).next().is_some()
    }

    /// True if `path` names a file or a folder.
    pub fn exists(&self, path: &VfsPath) -> bool {
        self.contains(path) || self.folder_exists(path)
    }

    /// Number of records, markers included.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every record, markers included, in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    /// Every record except `.keep` markers, in tree order (folders before
    /// files at each level, then by name).
    pub fn list_visible(&self) -> Vec<&FileRecord> {
        let mut visible: Vec<&FileRecord> =
            self.files.values().filter(|r| !r.is_sentinel()).collect();
        visible.sort_by(|a, b| tree_order(a.path.as_str(), b.path.as_str()));
        visible
    }

    /// Deep copy of the current contents.
    pub fn snapshot(&self) -> FileMap {
        self.files.clone()
    }

    // -- mutations --

    /// Insert or overwrite `record` at its own path, refreshing `last_modified`.
    ///
    /// `PathConflict` if a folder is at that path or a file sits above it.
    pub fn set(&mut self, mut record: FileRecord) -> Result<()> {
        if record.path.is_root() {
            return Err(Error::invalid_path("/", "the root folder cannot hold content"));
        }
        if let Some(file) = self.file_above(&record.path) {
            return Err(Error::conflict(file.as_str()));
        }
        if self.folder_exists(&record.path) {
            return Err(Error::conflict(record.path.as_str()));
        }
        record.last_modified = self.tick();
        debug!("vfs set {} ({})", record.path, record.file_type.as_str());
        self.files.insert(record.path.clone(), record);
        Ok(())
    }

    /// Create a new file; `PathConflict` if a file or folder already occupies `path`.
    pub fn create(&mut self, path: &VfsPath, file_type: FileType, content: &str) -> Result<()> {
        if self.exists(path) {
            return Err(Error::conflict(path.as_str()));
        }
        self.set(FileRecord::new(path.clone(), file_type, content))
    }

    /// Replace the content of an existing file (the editor's write path).
    pub fn write_content(&mut self, path: &VfsPath, content: &str) -> Result<()> {
        let mut record = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::not_found(path.as_str()))?;
        record.content = content.to_string();
        self.set(record)
    }

    /// Create an empty folder (writes its `.keep` marker).
    ///
    /// `PathConflict` if a file or a non-empty folder already occupies `folder`.
    pub fn create_folder(&mut self, folder: &VfsPath) -> Result<()> {
        if self.exists(folder) {
            return Err(Error::conflict(folder.as_str()));
        }
        self.ensure_folder(folder)
    }

    /// Make sure `folder` exists, adding its marker if it is absent.
    ///
    /// Succeeds without change when the folder already has content.
    pub fn ensure_folder(&mut self, folder: &VfsPath) -> Result<()> {
        if self.contains(folder) {
            return Err(Error::conflict(folder.as_str()));
        }
        let marker = folder.sentinel();
        if !self.contains(&marker) {
            self.set(FileRecord::sentinel(folder))?;
        }
        Ok(())
    }

    /// Remove exactly `path`. Returns the removed record, if any.
    pub fn delete(&mut self, path: &VfsPath) -> Option<FileRecord> {
        let removed = self.files.remove(path);
        if removed.is_some() {
            self.tick();
            debug!("vfs delete {}", path);
        }
        removed
    }

    /// Remove `folder` and everything nested under it. Returns removed paths.
    pub fn delete_folder(&mut self, folder: &VfsPath) -> Vec<VfsPath> {
        let doomed: Vec<VfsPath> = self
            .files
            .keys()
            .filter(|key| *key == folder || key.is_within(folder))
            .cloned()
            .collect();
        for key in &doomed {
            self.files.remove(key);
        }
        if !doomed.is_empty() {
            self.tick();
            debug!("vfs delete folder {} ({} entries)", folder, doomed.len());
        }
        doomed
    }

    /// Remove the file at `path`, or the folder at `path` when no file is there.
    ///
    /// Deleting a path that does not exist is a no-op returning no paths.
    pub fn remove(&mut self, path: &VfsPath) -> Vec<VfsPath> {
        match self.delete(path) {
            Some(record) => vec![record.path],
            None => self.delete_folder(path),
        }
    }

    /// Move a file, or a whole folder, from `old` to `new`.
    ///
    /// A folder is detected when no file exists at `old` but keys are nested
    /// under it; every nested key has its prefix rewritten. Fails with
    /// `PathConflict` (store unchanged) if any destination is already taken
    /// or a file sits above `new`.
    /// Returns the `(old, new)` pairs that moved.
    pub fn rename(&mut self, old: &VfsPath, new: &VfsPath) -> Result<Vec<(VfsPath, VfsPath)>> {
        if old == new {
            return Ok(Vec::new());
        }
        if new.is_root() || old.is_root() {
            return Err(Error::invalid_path(new.as_str(), "cannot rename the root folder"));
        }

        let moves: Vec<(VfsPath, VfsPath)> = if self.contains(old) {
            if self.exists(new) {
                return Err(Error::conflict(new.as_str()));
            }
            vec![(old.clone(), new.clone())]
        } else {
            if !self.folder_exists(old) {
                return Err(Error::not_found(old.as_str()));
            }
            if new.is_within(old) {
                return Err(Error::invalid_path(
                    new.as_str(),
                    "cannot move a folder inside itself",
                ));
            }
            if self.exists(new) {
                return Err(Error::conflict(new.as_str()));
            }
            let mut moves = Vec::new();
            for key in self.nested_keys(old) {
                let target = key
                    .rebase(old, new)
                    .ok_or_else(|| Error::invalid_path(key.as_str(), "cannot rebase path"))?;
                moves.push((key.clone(), target));
            }
            moves
        };

        if let Some(file) = self.file_above(new) {
            return Err(Error::conflict(file.as_str()));
        }

        let stamp = self.tick();
        for (from, to) in &moves {
            if let Some(record) = self.files.remove(from) {
                let mut record = record.moved_to(to.clone());
                record.last_modified = stamp;
                self.files.insert(to.clone(), record);
            }
        }
        debug!("vfs rename {} -> {} ({} entries)", old, new, moves.len());
        Ok(moves)
    }

    /// Copy the file at `path` to a free sibling name: `name-copy.ext`, then
    /// `name-copy-2.ext`, `name-copy-3.ext`, ... Returns the new path.
    pub fn duplicate(&mut self, path: &VfsPath) -> Result<VfsPath> {
        let source = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::not_found(path.as_str()))?;
        let parent = path.parent().unwrap_or_else(VfsPath::root);
        let (stem, ext) = path.stem_and_extension();
        let suffix = ext.map(|e| format!(".{}", e)).unwrap_or_default();

        let mut attempt = 1usize;
        let target = loop {
            let name = if attempt == 1 {
                format!("{}-copy{}", stem, suffix)
            } else {
                format!("{}-copy-{}{}", stem, attempt, suffix)
            };
            let candidate = parent.join(&name)?;
            if !self.exists(&candidate) {
                break candidate;
            }
            attempt += 1;
        };

        self.set(source.moved_to(target.clone()))?;
        Ok(target)
    }

    /// Discard current contents and install `files`.
    ///
    /// Records are re-keyed to the map key so `path`/`name` can never drift.
    pub fn replace_all(&mut self, files: FileMap) {
        let newest = files.values().map(|r| r.last_modified).max();
        self.files = files
            .into_iter()
            .filter(|(path, _)| !path.is_root())
            .map(|(path, record)| {
                let record = if record.path == path {
                    record
                } else {
                    record.moved_to(path.clone())
                };
                (path, record)
            })
            .collect();
        if newest > self.clock {
            self.clock = newest;
        }
        debug!("vfs replace all ({} entries)", self.files.len());
    }

    /// The nearest stored file among the ancestors of `path`.
    fn file_above(&self, path: &VfsPath) -> Option<VfsPath> {
        let mut current = path.parent();
        while let Some(folder) = current {
            if folder.is_root() {
                return None;
            }
            if self.contains(&folder) {
                return Some(folder);
            }
            current = folder.parent();
        }
        None
    }

    fn nested_keys<'a>(&'a self, folder: &'a VfsPath) -> impl Iterator<Item = &'a VfsPath> + 'a {
        self.files.keys().filter(move |key| key.is_within(folder))
    }

    /// Next strictly increasing modification stamp.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.clock {
            Some(last) if now <= last => last + TimeDelta::milliseconds(1),
            _ => now,
        };
        self.clock = Some(stamp);
        stamp
    }
}
