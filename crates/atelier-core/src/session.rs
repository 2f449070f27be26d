//! ProjectSession: one open project and everything that mutates it.
//!
//! The live [`VirtualFileStore`] is only changed here, either by a human
//! edit entry point or by applying a finished AI turn in one synchronous
//! batch. Persistence happens afterwards: edits mark the session dirty and
//! [`ProjectSession::save_if_due`] writes through the backend once the
//! debounce window has passed. A failed save never rolls the store back.

use std::fmt::Display;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::Stream;
use log::{info, warn};
use uuid::Uuid;

use crate::backend::{ProjectBackend, validate_project_id};
use crate::checkpoint::{self, Checkpoint, CheckpointManager, DiffEntry};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::highlight::ChangeHighlighter;
use crate::patch::{self, ApplySummary};
use crate::stream::{self, CancelFlag, StreamSink, TurnOutcome};
use crate::vfs::{FileRecord, FileType, VfsPath, VirtualFileStore};

/// What a finished AI turn did to the project.
#[derive(Debug)]
pub enum TurnStatus {
    /// Operations were applied.
    Applied {
        affected_paths: Vec<VfsPath>,
        /// File the UI should open, if this turn created the first file.
        open_hint: Option<VfsPath>,
        summary: ApplySummary,
        /// Automatic checkpoint taken after applying, if enabled.
        checkpoint: Option<Uuid>,
    },
    /// The response was explanation only.
    NoChanges,
    /// Nothing was applied: cancelled, transport failure or malformed patch.
    Failed(Error),
}

#[derive(Debug)]
pub struct TurnReport {
    pub narrative: String,
    pub truncated: bool,
    pub status: TurnStatus,
}

pub struct ProjectSession {
    project: String,
    backend: Arc<dyn ProjectBackend>,
    config: Config,
    store: VirtualFileStore,
    checkpoints: CheckpointManager,
    highlighter: ChangeHighlighter,
    open_file: Option<VfsPath>,
    /// Time of the oldest unsaved edit.
    dirty_since: Option<Instant>,
    /// Time of the newest unsaved edit; the debounce counts from here.
    last_edit: Option<Instant>,
}

impl ProjectSession {
    /// Open `project`, loading its files and checkpoints. A project that was
    /// never saved starts empty.
    pub async fn open(
        project: &str,
        backend: Arc<dyn ProjectBackend>,
        config: Config,
    ) -> Result<Self> {
        validate_project_id(project)?;
        let store = match backend.load(project).await {
            Ok(stored) => VirtualFileStore::from_files(stored.files),
            Err(e) if e.kind() == ErrorKind::NotFound => VirtualFileStore::new(),
            Err(e) => return Err(e.into()),
        };
        let checkpoints =
            CheckpointManager::from_checkpoints(backend.list_checkpoints(project).await?);
        info!(
            "opened project '{}' ({} files, {} checkpoints)",
            project,
            store.list_visible().len(),
            checkpoints.len()
        );
        let highlighter = ChangeHighlighter::new(config.highlight_expiry());
        Ok(Self {
            project: project.to_string(),
            backend,
            config,
            store,
            checkpoints,
            highlighter,
            open_file: None,
            dirty_since: None,
            last_edit: None,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &VirtualFileStore {
        &self.store
    }

    /// Checkpoints, newest first.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        self.checkpoints.list()
    }

    pub fn find_checkpoint(&self, id_or_prefix: &str) -> Result<&Checkpoint> {
        self.checkpoints.find(id_or_prefix)
    }

    pub fn open_file(&self) -> Option<&VfsPath> {
        self.open_file.as_ref()
    }

    /// Point the editor at `path`. `NotFound` if there is no file there.
    pub fn set_open_file(&mut self, path: Option<VfsPath>) -> Result<()> {
        if let Some(path) = &path
            && !self.store.contains(path)
        {
            return Err(Error::not_found(path.as_str()));
        }
        self.open_file = path;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// Paths highlighted at `now`.
    pub fn highlighted(&mut self, now: Instant) -> Vec<VfsPath> {
        self.highlighter.active(now).iter().cloned().collect()
    }

    pub fn is_highlighted(&mut self, path: &VfsPath, now: Instant) -> bool {
        self.highlighter.is_highlighted(path, now)
    }

    // -- human edits --

    pub fn create_file(
        &mut self,
        path: &VfsPath,
        file_type: FileType,
        content: &str,
    ) -> Result<()> {
        self.store.create(path, file_type, content)?;
        self.mark_dirty();
        Ok(())
    }

    /// Create the file, or overwrite the content of an existing one.
    pub fn write_file(
        &mut self,
        path: &VfsPath,
        file_type: Option<FileType>,
        content: &str,
    ) -> Result<()> {
        if self.store.contains(path) && file_type.is_none() {
            self.store.write_content(path, content)?;
        } else {
            let file_type = file_type.unwrap_or_else(|| FileType::from_path(path));
            self.store
                .set(FileRecord::new(path.clone(), file_type, content))?;
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn create_folder(&mut self, path: &VfsPath) -> Result<()> {
        self.store.create_folder(path)?;
        self.mark_dirty();
        Ok(())
    }

    /// Move a file or folder; the open file follows the move.
    pub fn rename(&mut self, old: &VfsPath, new: &VfsPath) -> Result<()> {
        let moves = self.store.rename(old, new)?;
        let followed = self
            .open_file
            .as_ref()
            .and_then(|open| moves.iter().find(|(from, _)| from == open))
            .map(|(_, to)| to.clone());
        if followed.is_some() {
            self.open_file = followed;
        }
        if !moves.is_empty() {
            self.mark_dirty();
        }
        Ok(())
    }

    /// Delete a file or a folder. `NotFound` when nothing is there.
    pub fn delete(&mut self, path: &VfsPath) -> Result<Vec<VfsPath>> {
        let removed = self.store.remove(path);
        if removed.is_empty() {
            return Err(Error::not_found(path.as_str()));
        }
        if self.open_file.as_ref().is_some_and(|open| removed.contains(open)) {
            self.open_file = None;
        }
        self.mark_dirty();
        Ok(removed)
    }

    pub fn duplicate(&mut self, path: &VfsPath) -> Result<VfsPath> {
        let copy = self.store.duplicate(path)?;
        self.mark_dirty();
        Ok(copy)
    }

    /// Every visible file as a fenced block headed by its path comment,
    /// read from the live store at call time.
    pub fn ai_context(&self) -> String {
        let mut out = String::new();
        for record in self.store.list_visible() {
            if record.file_type == FileType::Image {
                out.push_str(&format!(
                    "Image file {} ({} bytes, content omitted)\n\n",
                    record.path,
                    record.content.len()
                ));
                continue;
            }
            let fence = fence_for(&record.content);
            out.push_str(&format!("{}{}\n", fence, record.file_type.as_str()));
            out.push_str(&path_comment(record.file_type, &record.path));
            out.push('\n');
            out.push_str(&record.content);
            if !record.content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("{}\n\n", fence));
        }
        out.trim_end().to_string()
    }

    // -- AI turns --

    /// Stream one AI response into the project.
    ///
    /// The chunks only feed the parser; the store is touched once, after the
    /// stream has ended and its operations parsed.
    pub async fn run_turn<S, E, K>(
        &mut self,
        chunks: S,
        cancel: &CancelFlag,
        sink: &mut K,
    ) -> Result<TurnReport>
    where
        S: Stream<Item = std::result::Result<String, E>> + Unpin,
        E: Display,
        K: StreamSink + ?Sized,
    {
        let outcome = stream::run_turn(chunks, cancel, self.config.max_stream_bytes, sink).await?;
        Ok(self.finish_turn(outcome).await)
    }

    /// Apply a finished turn.
    pub async fn finish_turn(&mut self, outcome: TurnOutcome) -> TurnReport {
        let TurnOutcome {
            narrative,
            operations,
            truncated,
            ..
        } = outcome;

        let operations = match operations {
            Ok(ops) if ops.is_empty() => {
                return TurnReport {
                    narrative,
                    truncated,
                    status: TurnStatus::NoChanges,
                };
            }
            Ok(ops) => ops,
            Err(e) => {
                if let Error::MalformedPatch { reason, .. } = &e {
                    warn!("not applying malformed patch: {}", reason);
                }
                return TurnReport {
                    narrative,
                    truncated,
                    status: TurnStatus::Failed(e),
                };
            }
        };

        let result = patch::apply(&self.store, &operations, self.open_file.as_ref());
        self.store = result.store;
        info!(
            "applied {} operation(s): {} written, {} folder(s), {} deleted, {} skipped",
            operations.len(),
            result.summary.files_written,
            result.summary.folders_ensured,
            result.summary.paths_deleted,
            result.summary.skipped
        );
        self.drop_stale_open_file();
        if self.open_file.is_none() {
            self.open_file = result.open_hint.clone();
        }
        self.highlighter.mark(&result.affected_paths, Instant::now());
        self.mark_dirty();

        let checkpoint = if self.config.auto_checkpoint {
            let name = self.config.checkpoint_name(&narrative);
            match self.create_checkpoint(&name).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("automatic checkpoint not persisted: {}", e);
                    self.checkpoints.list().first().map(|c| c.id)
                }
            }
        } else {
            None
        };

        TurnReport {
            narrative,
            truncated,
            status: TurnStatus::Applied {
                affected_paths: result.affected_paths,
                open_hint: result.open_hint,
                summary: result.summary,
                checkpoint,
            },
        }
    }

    // -- checkpoints --

    /// Snapshot the live store. The checkpoint is kept in memory even when
    /// persisting it fails; the error is still returned.
    pub async fn create_checkpoint(&mut self, name: &str) -> Result<Uuid> {
        let checkpoint = self.checkpoints.create(&self.store, name).clone();
        if let Err(e) = self.backend.create_checkpoint(&self.project, &checkpoint).await {
            warn!("failed to persist checkpoint '{}': {}", name, e);
            return Err(e.into());
        }
        Ok(checkpoint.id)
    }

    pub async fn delete_checkpoint(&mut self, id: &Uuid) -> Result<()> {
        let removed = self
            .checkpoints
            .delete(id)
            .ok_or_else(|| Error::CheckpointNotFound { id: id.to_string() })?;
        match self.backend.delete_checkpoint(&self.project, &removed.id).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("failed to delete stored checkpoint {}: {}", id, e);
                Err(e.into())
            }
        }
    }

    /// Replace the whole store with the checkpoint's files.
    pub fn restore_checkpoint(&mut self, id: &Uuid) -> Result<Vec<VfsPath>> {
        let files = self.checkpoints.restore(id)?;
        self.store.replace_all(files);
        let restored: Vec<VfsPath> = self
            .store
            .list_visible()
            .iter()
            .map(|r| r.path.clone())
            .collect();
        self.drop_stale_open_file();
        self.highlighter.mark(&restored, Instant::now());
        self.mark_dirty();
        Ok(restored)
    }

    /// Differences between a checkpoint (or an empty project) and the live store.
    pub fn diff(&self, id: Option<&Uuid>) -> Result<Vec<DiffEntry>> {
        let checkpoint = match id {
            Some(id) => Some(
                self.checkpoints
                    .get(id)
                    .ok_or_else(|| Error::CheckpointNotFound { id: id.to_string() })?,
            ),
            None => None,
        };
        Ok(checkpoint::diff(checkpoint, &self.store))
    }

    // -- persistence --

    /// Save if the session is dirty and no edit happened during the last
    /// debounce window. Returns true if a save ran.
    pub async fn save_if_due(&mut self, now: Instant) -> Result<bool> {
        let Some(last_edit) = self.last_edit else {
            return Ok(false);
        };
        if now.saturating_duration_since(last_edit) < self.config.save_debounce() {
            return Ok(false);
        }
        self.save_now().await?;
        Ok(true)
    }

    /// Write the store through the backend now. On failure the session stays
    /// dirty so the next debounce retries.
    pub async fn save_now(&mut self) -> Result<()> {
        let files = self.store.snapshot();
        match self.backend.save(&self.project, &files).await {
            Ok(()) => {
                info!("saved project '{}'", self.project);
                self.dirty_since = None;
                self.last_edit = None;
                Ok(())
            }
            Err(e) => {
                warn!("saving project '{}' failed: {}", self.project, e);
                Err(Error::Persistence(e))
            }
        }
    }

    fn drop_stale_open_file(&mut self) {
        if self
            .open_file
            .as_ref()
            .is_some_and(|open| !self.store.contains(open))
        {
            self.open_file = None;
        }
    }

    fn mark_dirty(&mut self) {
        let now = Instant::now();
        self.dirty_since.get_or_insert(now);
        self.last_edit = Some(now);
    }
}

/// A backtick fence longer than any backtick run in `content`.
fn fence_for(content: &str) -> String {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn path_comment(file_type: FileType, path: &VfsPath) -> String {
    match file_type {
        FileType::Html | FileType::Markdown => format!("<!-- {} -->", path),
        FileType::Css => format!("/* {} */", path),
        _ => format!("// {}", path),
    }
}
