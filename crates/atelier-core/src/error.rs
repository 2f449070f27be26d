//! Error taxonomy for atelier-core.
//!
//! Expected conditions (conflicts, missing paths, malformed AI output) are
//! ordinary variants that callers surface to the user. Nothing in the core
//! panics on them.

use std::io;

use thiserror::Error;

/// Errors produced by the project core.
#[derive(Debug, Error)]
pub enum Error {
    /// A create/rename/duplicate would land on a path that is already taken.
    #[error("path already exists: {path}")]
    PathConflict { path: String },

    /// The addressed file or folder does not exist.
    #[error("no such file or folder: {path}")]
    NotFound { path: String },

    /// The path cannot be represented in the virtual file system.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The trailing JSON operation block could not be parsed, even after
    /// sanitisation. `raw` holds the block exactly as the model emitted it.
    #[error("malformed patch: {reason}")]
    MalformedPatch { raw: String, reason: String },

    /// The user aborted the stream.
    #[error("stream cancelled")]
    StreamCancelled,

    /// The response outgrew the buffer limit, so its operation list was
    /// never seen in full.
    #[error("response exceeded {limit} bytes; nothing was applied")]
    StreamTruncated { limit: usize },

    /// The AI transport failed (network, auth, rate limit, ...).
    #[error("stream transport error: {0}")]
    StreamTransport(String),

    /// Writing to or reading from the project backend failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] io::Error),

    #[error("no checkpoint with id {id}")]
    CheckpointNotFound { id: String },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn conflict(path: impl Into<String>) -> Self {
        Error::PathConflict { path: path.into() }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// For front ends that report through `io::Result`.
impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Persistence(inner) => inner,
            other => {
                let kind = match &other {
                    Error::NotFound { .. } | Error::CheckpointNotFound { .. } => {
                        io::ErrorKind::NotFound
                    }
                    Error::PathConflict { .. } => io::ErrorKind::AlreadyExists,
                    Error::InvalidPath { .. } => io::ErrorKind::InvalidInput,
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(kind, other.to_string())
            }
        }
    }
}

/// Result alias used throughout atelier-core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_path() {
        let err = Error::conflict("/a/b.txt");
        assert_eq!(err.to_string(), "path already exists: /a/b.txt");
    }

    #[test]
    fn test_io_error_converts_to_persistence() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_converts_back_to_io_error() {
        let err: io::Error = Error::conflict("/a").into();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        let inner = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: io::Error = Error::Persistence(inner).into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_malformed_patch_keeps_raw_text() {
        let err = Error::MalformedPatch {
            raw: "{\"files\": [".to_string(),
            reason: "EOF".to_string(),
        };
        if let Error::MalformedPatch { raw, .. } = &err {
            assert_eq!(raw, "{\"files\": [");
        }
        assert!(err.to_string().contains("EOF"));
    }
}
