//! Checkpoints: named, immutable full snapshots of a project's files.
//!
//! A checkpoint owns a deep copy of the store map taken at creation time, so
//! later edits to the live store never reach it. Restoring hands the copy
//! back for a full replace.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::vfs::{FileMap, VfsPath, VirtualFileStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub files: FileMap,
}

impl Checkpoint {
    /// Number of user-visible files captured.
    pub fn visible_len(&self) -> usize {
        self.files.keys().filter(|p| !p.is_sentinel()).count()
    }
}

/// How a path differs between a checkpoint and the live store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffStatus {
    Added,
    Modified,
    Deleted,
}

impl DiffStatus {
    /// One-letter marker used in listings.
    pub fn marker(&self) -> char {
        match self {
            DiffStatus::Added => 'A',
            DiffStatus::Modified => 'M',
            DiffStatus::Deleted => 'D',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: VfsPath,
    pub status: DiffStatus,
}

/// Ordered checkpoint list for one project, newest first.
#[derive(Debug, Clone, Default)]
pub struct CheckpointManager {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager over an existing list; re-sorted newest first.
    pub fn from_checkpoints(mut checkpoints: Vec<Checkpoint>) -> Self {
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self { checkpoints }
    }

    /// Capture `store` under `name` and put it at the front of the list.
    pub fn create(&mut self, store: &VirtualFileStore, name: &str) -> &Checkpoint {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
            files: store.snapshot(),
        };
        info!(
            "checkpoint '{}' created ({} files)",
            checkpoint.name,
            checkpoint.visible_len()
        );
        self.checkpoints.insert(0, checkpoint);
        &self.checkpoints[0]
    }

    /// Newest first.
    pub fn list(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn get(&self, id: &Uuid) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| &c.id == id)
    }

    /// Find a checkpoint by full id or by a unique id prefix.
    pub fn find(&self, id_or_prefix: &str) -> Result<&Checkpoint> {
        let needle = id_or_prefix.trim().to_ascii_lowercase();
        let mut matches = self
            .checkpoints
            .iter()
            .filter(|c| !needle.is_empty() && c.id.to_string().starts_with(&needle));
        match (matches.next(), matches.next()) {
            (Some(found), None) => Ok(found),
            _ => Err(Error::CheckpointNotFound {
                id: id_or_prefix.to_string(),
            }),
        }
    }

    /// The files to feed into [`VirtualFileStore::replace_all`]. Always a full
    /// replace: anything not in the checkpoint is dropped by the caller.
    pub fn restore(&self, id: &Uuid) -> Result<FileMap> {
        let checkpoint = self.get(id).ok_or_else(|| Error::CheckpointNotFound {
            id: id.to_string(),
        })?;
        info!("restoring checkpoint '{}'", checkpoint.name);
        Ok(checkpoint.files.clone())
    }

    /// Drop one checkpoint. Returns it if it existed.
    pub fn delete(&mut self, id: &Uuid) -> Option<Checkpoint> {
        let index = self.checkpoints.iter().position(|c| &c.id == id)?;
        let removed = self.checkpoints.remove(index);
        info!("checkpoint '{}' deleted", removed.name);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

/// Compare a checkpoint (or nothing) against the live store.
///
/// Paths only in the store are `Added`, only in the checkpoint `Deleted`,
/// in both with different content `Modified`. Markers are left out. The
/// result is sorted by path.
pub fn diff(checkpoint: Option<&Checkpoint>, live: &VirtualFileStore) -> Vec<DiffEntry> {
    let empty = FileMap::new();
    let before = checkpoint.map(|c| &c.files).unwrap_or(&empty);
    let mut entries = Vec::new();

    for record in live.iter().filter(|r| !r.is_sentinel()) {
        let status = match before.get(&record.path) {
            None => DiffStatus::Added,
            Some(old) if old.content != record.content => DiffStatus::Modified,
            Some(_) => continue,
        };
        entries.push(DiffEntry {
            path: record.path.clone(),
            status,
        });
    }
    for path in before.keys().filter(|p| !p.is_sentinel()) {
        if !live.contains(path) {
            entries.push(DiffEntry {
                path: path.clone(),
                status: DiffStatus::Deleted,
            });
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{FileRecord, FileType};

    fn p(path: &str) -> VfsPath {
        VfsPath::new(path).unwrap()
    }

    fn store_with(files: &[(&str, &str)]) -> VirtualFileStore {
        let mut store = VirtualFileStore::new();
        for (path, content) in files {
            let path = p(path);
            let file_type = FileType::from_path(&path);
            store.set(FileRecord::new(path, file_type, *content)).unwrap();
        }
        store
    }

    #[test]
    fn test_create_is_newest_first() {
        let store = store_with(&[("/a.txt", "1")]);
        let mut manager = CheckpointManager::new();
        let first = manager.create(&store, "first").id;
        let second = manager.create(&store, "second").id;
        let ids: Vec<Uuid> = manager.list().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_checkpoint_isolated_from_later_edits() {
        let mut store = store_with(&[("/a.txt", "before")]);
        let mut manager = CheckpointManager::new();
        let id = manager.create(&store, "x").id;
        store.write_content(&p("/a.txt"), "after").unwrap();
        store.set(FileRecord::new(p("/b.txt"), FileType::Plaintext, "new")).unwrap();
        let checkpoint = manager.get(&id).unwrap();
        assert_eq!(checkpoint.files[&p("/a.txt")].content, "before");
        assert!(!checkpoint.files.contains_key(&p("/b.txt")));
    }

    #[test]
    fn test_restore_round_trips_snapshot() {
        let mut store = store_with(&[("/index.html", "<p>"), ("/css/site.css", "a{}")]);
        store.create_folder(&p("/empty")).unwrap();
        let taken = store.snapshot();
        let mut manager = CheckpointManager::new();
        let id = manager.create(&store, "x").id;
        assert_eq!(manager.restore(&id).unwrap(), taken);
    }

    #[test]
    fn test_restore_unknown_id() {
        let manager = CheckpointManager::new();
        assert!(matches!(
            manager.restore(&Uuid::new_v4()),
            Err(Error::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_leaves_others() {
        let store = store_with(&[("/a.txt", "1")]);
        let mut manager = CheckpointManager::new();
        let keep = manager.create(&store, "keep").id;
        let drop = manager.create(&store, "drop").id;
        assert!(manager.delete(&drop).is_some());
        assert!(manager.delete(&drop).is_none());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.list()[0].id, keep);
    }

    #[test]
    fn test_find_by_prefix() {
        let store = VirtualFileStore::new();
        let mut manager = CheckpointManager::new();
        let id = manager.create(&store, "x").id;
        let full = id.to_string();
        assert_eq!(manager.find(&full[..8]).unwrap().id, id);
        assert_eq!(manager.find(&full.to_uppercase()).unwrap().id, id);
        assert!(manager.find("").is_err());
        assert!(manager.find("zzzz").is_err());
    }

    #[test]
    fn test_diff_modified_and_added() {
        let before = store_with(&[("/a.css", "body{}")]);
        let mut manager = CheckpointManager::new();
        let id = manager.create(&before, "x").id;
        let live = store_with(&[("/a.css", "body{color:red}"), ("/b.js", "x")]);
        let entries = diff(manager.get(&id), &live);
        assert_eq!(
            entries,
            vec![
                DiffEntry { path: p("/a.css"), status: DiffStatus::Modified },
                DiffEntry { path: p("/b.js"), status: DiffStatus::Added },
            ]
        );
    }

    #[test]
    fn test_diff_deleted_and_markers_hidden() {
        let mut before = store_with(&[("/gone.txt", "x"), ("/same.txt", "s")]);
        before.create_folder(&p("/old")).unwrap();
        let mut manager = CheckpointManager::new();
        let id = manager.create(&before, "x").id;
        let mut live = store_with(&[("/same.txt", "s")]);
        live.create_folder(&p("/new")).unwrap();
        let entries = diff(manager.get(&id), &live);
        assert_eq!(
            entries,
            vec![DiffEntry { path: p("/gone.txt"), status: DiffStatus::Deleted }]
        );
    }

    #[test]
    fn test_diff_without_checkpoint_is_all_added() {
        let live = store_with(&[("/b.txt", ""), ("/a.txt", "")]);
        let entries = diff(None, &live);
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/b.txt"]);
        assert!(entries.iter().all(|e| e.status == DiffStatus::Added));
    }

    #[test]
    fn test_checkpoint_serde_round_trip() {
        let store = store_with(&[("/a.txt", "hi")]);
        let mut manager = CheckpointManager::new();
        let checkpoint = manager.create(&store, "x").clone();
        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }
}
