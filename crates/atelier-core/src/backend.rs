//! Project storage backends.
//!
//! The session keeps the in-memory store authoritative and writes through a
//! [`ProjectBackend`] afterwards. Backends only store and fetch whole
//! projects and individual checkpoints; last write wins.
//!
//! Methods return boxed futures so `Box<dyn ProjectBackend>` works. All input
//! references share one lifetime `'a` so the future can borrow from both
//! `&self` and the arguments.

use std::collections::HashMap;
use std::future::Future;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::vfs::FileMap;

/// Boxed, Send future returned by every backend method.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const PROJECT_FILE: &str = "project.json";
const CHECKPOINT_DIR: &str = "checkpoints";

/// A project as stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProject {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub files: FileMap,
}

/// Storage for projects and their checkpoints.
pub trait ProjectBackend: Send + Sync {
    /// Load a project. `NotFound` if it was never saved.
    fn load<'a>(&'a self, project: &'a str) -> BoxFuture<'a, io::Result<StoredProject>>;

    /// Replace the stored files of a project.
    fn save<'a>(&'a self, project: &'a str, files: &'a FileMap) -> BoxFuture<'a, io::Result<()>>;

    fn create_checkpoint<'a>(
        &'a self,
        project: &'a str,
        checkpoint: &'a Checkpoint,
    ) -> BoxFuture<'a, io::Result<()>>;

    /// Every checkpoint of a project, newest first.
    fn list_checkpoints<'a>(&'a self, project: &'a str)
    -> BoxFuture<'a, io::Result<Vec<Checkpoint>>>;

    /// Remove a checkpoint. `NotFound` if there is no such checkpoint.
    fn delete_checkpoint<'a>(&'a self, project: &'a str, id: &'a Uuid)
    -> BoxFuture<'a, io::Result<()>>;
}

/// Reject project ids that cannot be used as a single directory name.
pub fn validate_project_id(project: &str) -> io::Result<()> {
    let valid = !project.is_empty()
        && project != "."
        && project != ".."
        && project
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid project id '{}'", project),
        ))
    }
}

fn newest_first(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// JSON files on the local filesystem.
///
/// ```text
/// <root>/<project>/project.json
/// <root>/<project>/checkpoints/<id>.json
/// ```
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn project_dir(&self, project: &str) -> io::Result<PathBuf> {
        validate_project_id(project)?;
        Ok(self.root.join(project))
    }

    fn checkpoint_path(&self, project: &str, id: &Uuid) -> io::Result<PathBuf> {
        Ok(self
            .project_dir(project)?
            .join(CHECKPOINT_DIR)
            .join(format!("{}.json", id)))
    }

    async fn write_json<T: Serialize + Sync>(path: PathBuf, value: &T) -> io::Result<()> {
        // Serialize up front; the blocking closure needs owned data.
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        tokio::task::spawn_blocking(move || crate::safe_io::atomic_write(&path, &bytes))
            .await
            .map_err(|e| io::Error::other(format!("join error: {}", e)))?
    }

    async fn read_json<T: DeserializeOwned>(path: PathBuf) -> io::Result<T> {
        let bytes = fs::read(&path).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("{}: {}", path.display(), e),
            )
        })
    }
}

impl ProjectBackend for LocalBackend {
    fn load<'a>(&'a self, project: &'a str) -> BoxFuture<'a, io::Result<StoredProject>> {
        Box::pin(async move {
            let path = self.project_dir(project)?.join(PROJECT_FILE);
            Self::read_json(path).await
        })
    }

    fn save<'a>(&'a self, project: &'a str, files: &'a FileMap) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let path = self.project_dir(project)?.join(PROJECT_FILE);
            let stored = StoredProject {
                id: project.to_string(),
                updated_at: Utc::now(),
                files: files.clone(),
            };
            Self::write_json(path, &stored).await?;
            debug!("saved project '{}' ({} entries)", project, files.len());
            Ok(())
        })
    }

    fn create_checkpoint<'a>(
        &'a self,
        project: &'a str,
        checkpoint: &'a Checkpoint,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let path = self.checkpoint_path(project, &checkpoint.id)?;
            Self::write_json(path, checkpoint).await
        })
    }

    fn list_checkpoints<'a>(
        &'a self,
        project: &'a str,
    ) -> BoxFuture<'a, io::Result<Vec<Checkpoint>>> {
        Box::pin(async move {
            let dir = self.project_dir(project)?.join(CHECKPOINT_DIR);
            if fs::metadata(&dir).await.is_err() {
                return Ok(Vec::new());
            }
            let mut checkpoints = Vec::new();
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    checkpoints.push(Self::read_json::<Checkpoint>(path).await?);
                }
            }
            newest_first(&mut checkpoints);
            Ok(checkpoints)
        })
    }

    fn delete_checkpoint<'a>(
        &'a self,
        project: &'a str,
        id: &'a Uuid,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { fs::remove_file(self.checkpoint_path(project, id)?).await })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    projects: HashMap<String, StoredProject>,
    checkpoints: HashMap<String, Vec<Checkpoint>>,
}

/// In-process backend for tests and embedding.
///
/// `set_failing(true)` makes every write fail, to exercise the session's
/// persistence error path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(io::Error::other("backend unavailable"))
        } else {
            Ok(())
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> io::Result<T>) -> io::Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("memory backend lock poisoned"))?;
        f(&mut state)
    }
}

impl ProjectBackend for MemoryBackend {
    fn load<'a>(&'a self, project: &'a str) -> BoxFuture<'a, io::Result<StoredProject>> {
        Box::pin(async move {
            self.with_state(|state| {
                state.projects.get(project).cloned().ok_or_else(|| {
                    io::Error::new(ErrorKind::NotFound, format!("no project '{}'", project))
                })
            })
        })
    }

    fn save<'a>(&'a self, project: &'a str, files: &'a FileMap) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.check_writable()?;
            self.with_state(|state| {
                state.projects.insert(
                    project.to_string(),
                    StoredProject {
                        id: project.to_string(),
                        updated_at: Utc::now(),
                        files: files.clone(),
                    },
                );
                Ok(())
            })
        })
    }

    fn create_checkpoint<'a>(
        &'a self,
        project: &'a str,
        checkpoint: &'a Checkpoint,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.check_writable()?;
            self.with_state(|state| {
                let list = state.checkpoints.entry(project.to_string()).or_default();
                list.retain(|c| c.id != checkpoint.id);
                list.push(checkpoint.clone());
                Ok(())
            })
        })
    }

    fn list_checkpoints<'a>(
        &'a self,
        project: &'a str,
    ) -> BoxFuture<'a, io::Result<Vec<Checkpoint>>> {
        Box::pin(async move {
            self.with_state(|state| {
                let mut list = state.checkpoints.get(project).cloned().unwrap_or_default();
                newest_first(&mut list);
                Ok(list)
            })
        })
    }

    fn delete_checkpoint<'a>(
        &'a self,
        project: &'a str,
        id: &'a Uuid,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.check_writable()?;
            self.with_state(|state| {
                let list = state.checkpoints.entry(project.to_string()).or_default();
                let before = list.len();
                list.retain(|c| &c.id != id);
                if list.len() == before {
                    return Err(io::Error::new(
                        ErrorKind::NotFound,
                        format!("no checkpoint {}", id),
                    ));
                }
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointManager;
    use crate::vfs::{FileRecord, FileType, VfsPath, VirtualFileStore};
    use tempfile::TempDir;

    fn sample_store() -> VirtualFileStore {
        let mut store = VirtualFileStore::new();
        let path = VfsPath::new("/index.html").unwrap();
        store
            .set(FileRecord::new(path, FileType::Html, "<h1>Hi</h1>"))
            .unwrap();
        store.create_folder(&VfsPath::new("/img").unwrap()).unwrap();
        store
    }

    async fn exercise(backend: &dyn ProjectBackend) {
        let err = backend.load("site").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let store = sample_store();
        backend.save("site", &store.snapshot()).await.unwrap();
        let loaded = backend.load("site").await.unwrap();
        assert_eq!(loaded.id, "site");
        assert_eq!(loaded.files, store.snapshot());

        let mut manager = CheckpointManager::new();
        let mut older = manager.create(&store, "older").clone();
        older.created_at -= chrono::Duration::seconds(60);
        let newer = manager.create(&store, "newer").clone();
        backend.create_checkpoint("site", &older).await.unwrap();
        backend.create_checkpoint("site", &newer).await.unwrap();
        let listed: Vec<String> = backend
            .list_checkpoints("site")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(listed, vec!["newer", "older"]);

        backend.delete_checkpoint("site", &older.id).await.unwrap();
        assert_eq!(backend.list_checkpoints("site").await.unwrap().len(), 1);
        assert!(backend.delete_checkpoint("site", &older.id).await.is_err());
        assert!(backend.list_checkpoints("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_backend_contract() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().to_path_buf());
        exercise(&backend).await;
        assert!(dir.path().join("site").join(PROJECT_FILE).exists());
    }

    #[tokio::test]
    async fn test_memory_backend_contract() {
        exercise(&MemoryBackend::new()).await;
    }

    #[tokio::test]
    async fn test_memory_backend_failing_writes() {
        let backend = MemoryBackend::new();
        backend.set_failing(true);
        assert!(backend.save("p", &FileMap::new()).await.is_err());
        backend.set_failing(false);
        assert!(backend.save("p", &FileMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_backend_rejects_bad_project_ids() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().to_path_buf());
        for bad in ["", "..", "a/b", "x y"] {
            let err = backend.save(bad, &FileMap::new()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
    }
}
