//! VFS data types shared across the module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::path::VfsPath;

/// Kind of content a file holds.
///
/// Closed set; consumers (editor language mode, preview inlining) match on it
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Html,
    Css,
    #[serde(alias = "js")]
    Javascript,
    #[serde(alias = "ts")]
    Typescript,
    Json,
    #[serde(alias = "md")]
    Markdown,
    Image,
    #[serde(alias = "text", alias = "txt")]
    Plaintext,
    /// The `.keep` marker of an otherwise empty folder.
    #[serde(rename = "folder", alias = "folder-marker", alias = "directory")]
    FolderMarker,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Html => "html",
            FileType::Css => "css",
            FileType::Javascript => "javascript",
            FileType::Typescript => "typescript",
            FileType::Json => "json",
            FileType::Markdown => "markdown",
            FileType::Image => "image",
            FileType::Plaintext => "plaintext",
            FileType::FolderMarker => "folder",
        }
    }

    /// Infer the type from a fence language tag (`html`, `js`, `tsx`, ...).
    ///
    /// Unknown tags map to `Plaintext`.
    pub fn from_language(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" | "xhtml" => FileType::Html,
            "css" | "scss" | "sass" | "less" => FileType::Css,
            "js" | "javascript" | "jsx" | "mjs" | "cjs" => FileType::Javascript,
            "ts" | "typescript" | "tsx" => FileType::Typescript,
            "json" => FileType::Json,
            "md" | "markdown" => FileType::Markdown,
            "svg" | "png" | "jpg" | "jpeg" | "gif" | "webp" | "ico" | "image" => FileType::Image,
            _ => FileType::Plaintext,
        }
    }

    /// Infer the type from a path's extension; a `.keep` marker is `FolderMarker`.
    pub fn from_path(path: &VfsPath) -> Self {
        if path.is_sentinel() {
            return FileType::FolderMarker;
        }
        match path.stem_and_extension().1 {
            Some(ext) => Self::from_language(ext),
            None => FileType::Plaintext,
        }
    }

    /// Type for a fenced block: the language tag when it names a known type,
    /// otherwise the path's extension.
    pub fn for_block(language: &str, path: &VfsPath) -> Self {
        match Self::from_language(language) {
            FileType::Plaintext => Self::from_path(path),
            known => known,
        }
    }
}

/// A single file in the virtual file system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: VfsPath,
    /// Last path segment, kept alongside `path` for display.
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Text content. Images are stored as a data URI or base64 string.
    pub content: String,
    pub last_modified: DateTime<Utc>,
}

impl FileRecord {
    /// Build a record for `path`, deriving `name` from it.
    pub fn new(path: VfsPath, file_type: FileType, content: impl Into<String>) -> Self {
        let name = path.file_name().unwrap_or_default().to_string();
        Self {
            path,
            name,
            file_type,
            content: content.into(),
            last_modified: Utc::now(),
        }
    }

    /// Zero-length marker for the folder at `folder`.
    pub fn sentinel(folder: &VfsPath) -> Self {
        Self::new(folder.sentinel(), FileType::FolderMarker, "")
    }

    pub fn is_sentinel(&self) -> bool {
        self.path.is_sentinel()
    }

    /// Re-key the record to `path`, keeping content and type.
    pub(crate) fn moved_to(mut self, path: VfsPath) -> Self {
        self.name = path.file_name().unwrap_or_default().to_string();
        self.path = path;
        self
    }
}
