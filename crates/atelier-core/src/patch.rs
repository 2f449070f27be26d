//! Patch application: file operations emitted by the AI, applied as one batch.
//!
//! Operations arrive on the wire as [`RawOperation`] (loosely typed JSON) and
//! are validated into [`StreamOperation`] before they reach [`apply`]. The
//! batch runs on a working copy of the store in a single synchronous pass, so
//! no other mutation can interleave and the caller swaps in the result only
//! once every operation has been processed.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vfs::{FileRecord, FileType, VfsPath, VirtualFileStore};

/// What an operation does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// Operation exactly as it appears in the model's JSON block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOperation {
    pub action: Action,
    pub path: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Validated file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOperation {
    /// Create or overwrite a file.
    Write {
        action: Action,
        path: VfsPath,
        file_type: FileType,
        content: String,
    },
    /// Make sure a folder exists (via its `.keep` marker).
    Folder { path: VfsPath },
    /// Remove a file, or a folder and everything under it.
    Delete { path: VfsPath },
}

impl StreamOperation {
    /// Implicit `update` for a completed file block.
    pub fn update(path: VfsPath, file_type: FileType, content: impl Into<String>) -> Self {
        StreamOperation::Write {
            action: Action::Update,
            path,
            file_type,
            content: content.into(),
        }
    }

    pub fn path(&self) -> &VfsPath {
        match self {
            StreamOperation::Write { path, .. }
            | StreamOperation::Folder { path }
            | StreamOperation::Delete { path } => path,
        }
    }

    /// Validate a wire operation.
    ///
    /// The path is normalized; the root and anything with `.`/`..` components
    /// is rejected. A create/update is a folder request when its type names a
    /// folder, or when it has neither type nor content, or when the raw path
    /// ends in `/`. A file write without content writes an empty file.
    pub fn from_raw(raw: RawOperation) -> Result<Self> {
        let path = VfsPath::new(&raw.path)?;
        if path.is_root() {
            return Err(Error::invalid_path(raw.path, "operations cannot target the root"));
        }
        if raw.action == Action::Delete {
            return Ok(StreamOperation::Delete { path });
        }

        let declared = raw.file_type.as_deref().map(str::trim);
        let is_folder = match declared {
            Some(tag) => matches!(
                tag.to_ascii_lowercase().as_str(),
                "folder" | "folder-marker" | "directory" | "dir"
            ),
            None => raw.content.is_none() || raw.path.trim_end().ends_with('/'),
        };
        if is_folder {
            return Ok(StreamOperation::Folder { path });
        }

        let file_type = match declared {
            Some(tag) => FileType::for_block(tag, &path),
            None => FileType::from_path(&path),
        };
        Ok(StreamOperation::Write {
            action: raw.action,
            path,
            file_type,
            content: raw.content.unwrap_or_default(),
        })
    }
}

/// Validate a list of wire operations, dropping the invalid ones.
pub fn validate(raw: Vec<RawOperation>) -> Vec<StreamOperation> {
    raw.into_iter()
        .filter_map(|op| {
            let shown = op.path.clone();
            match StreamOperation::from_raw(op) {
                Ok(op) => Some(op),
                Err(e) => {
                    warn!("dropping operation on '{}': {}", shown, e);
                    None
                }
            }
        })
        .collect()
}

/// Counts of what a batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub files_written: usize,
    pub folders_ensured: usize,
    pub paths_deleted: usize,
    pub skipped: usize,
}

/// Result of applying a batch.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// The store after every operation ran.
    pub store: VirtualFileStore,
    /// Every path referenced by an operation, deduplicated, in first-seen order.
    pub affected_paths: Vec<VfsPath>,
    /// File the UI should open: set when nothing was open and this batch
    /// placed the first file in an empty project.
    pub open_hint: Option<VfsPath>,
    pub summary: ApplySummary,
}

/// Apply `operations` in order to a copy of `store`.
///
/// Later operations on the same path override earlier ones. Deleting a
/// missing path is a no-op. A write that would put a file on a folder (or
/// under a file), and a folder request that collides with a file, are
/// skipped and logged; nothing else can fail.
pub fn apply(
    store: &VirtualFileStore,
    operations: &[StreamOperation],
    open_file: Option<&VfsPath>,
) -> PatchOutcome {
    let mut working = store.clone();
    let mut affected: Vec<VfsPath> = Vec::new();
    let mut open_hint = None;
    let mut summary = ApplySummary::default();
    let started_empty = store.list_visible().is_empty();

    for op in operations {
        let path = op.path();
        if !affected.contains(path) {
            affected.push(path.clone());
        }

        match op {
            StreamOperation::Delete { path } => {
                let removed = working.remove(path);
                debug!("patch delete {} ({} removed)", path, removed.len());
                summary.paths_deleted += removed.len();
            }
            StreamOperation::Folder { path } => match working.ensure_folder(path) {
                Ok(()) => {
                    debug!("patch folder {}", path);
                    summary.folders_ensured += 1;
                }
                Err(e) => {
                    warn!("skipping folder operation on {}: {}", path, e);
                    summary.skipped += 1;
                }
            },
            StreamOperation::Write {
                action,
                path,
                file_type,
                content,
            } => {
                let record = FileRecord::new(path.clone(), *file_type, content.as_str());
                match working.set(record) {
                    Ok(()) => {
                        debug!("patch {:?} {}", action, path);
                        summary.files_written += 1;
                        if open_file.is_none() && started_empty && open_hint.is_none() {
                            open_hint = Some(path.clone());
                        }
                    }
                    Err(e) => {
                        warn!("skipping write to {}: {}", path, e);
                        summary.skipped += 1;
                    }
                }
            }
        }
    }

    PatchOutcome {
        store: working,
        affected_paths: affected,
        open_hint,
        summary,
    }
}
