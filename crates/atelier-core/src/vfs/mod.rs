//! Virtual file system: the in-memory project file store.
//!
//! A project is a flat map from absolute path to [`FileRecord`]. Folder
//! structure is implied by path prefixes; empty folders are kept alive by a
//! `.keep` marker file that is hidden from every listing but still counts
//! for existence checks.
//!
//! ```text
//! human edits ─┐
//! patch apply ─┼─> VirtualFileStore ──> tree / preview / AI context
//! restore ─────┘
//! ```

pub mod path;
pub mod store;
pub mod tree;
pub mod types;

pub use path::{SENTINEL_NAME, VfsPath, is_folder_prefix_of, normalize, parent_of, resolve_relative};
pub use store::{FileMap, VirtualFileStore};
pub use tree::{TreeNode, tree_order};
pub use types::{FileRecord, FileType};
