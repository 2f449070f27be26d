//! Derived tree view of the flat store, for the file-tree consumer.
//!
//! The tree is rebuilt from the store on demand and thrown away afterwards;
//! it is never authoritative. Folders implied only by a `.keep` marker are
//! shown, the marker itself is not.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::path::VfsPath;
use super::store::VirtualFileStore;
use super::types::FileType;

/// A node of the derived tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Folder {
        name: String,
        path: VfsPath,
        children: Vec<TreeNode>,
    },
    File {
        name: String,
        path: VfsPath,
        file_type: FileType,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Folder { name, .. } | TreeNode::File { name, .. } => name,
        }
    }

    pub fn path(&self) -> &VfsPath {
        match self {
            TreeNode::Folder { path, .. } | TreeNode::File { path, .. } => path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, TreeNode::Folder { .. })
    }
}

/// Intermediate builder keyed by segment name.
#[derive(Default)]
struct FolderBuilder {
    folders: BTreeMap<String, FolderBuilder>,
    files: BTreeMap<String, (VfsPath, FileType)>,
}

impl FolderBuilder {
    fn into_nodes(self, parent: &VfsPath) -> Vec<TreeNode> {
        let mut nodes = Vec::with_capacity(self.folders.len() + self.files.len());
        for (name, folder) in self.folders {
            // Segment names came from validated paths, so joining cannot fail.
            let Ok(path) = parent.join(&name) else {
                continue;
            };
            let children = folder.into_nodes(&path);
            nodes.push(TreeNode::Folder {
                name,
                path,
                children,
            });
        }
        for (name, (path, file_type)) in self.files {
            nodes.push(TreeNode::File {
                name,
                path,
                file_type,
            });
        }
        nodes
    }
}

/// Build the tree for every record in `store`: folders first, then files,
/// each group sorted by name.
pub fn build(store: &VirtualFileStore) -> Vec<TreeNode> {
    let mut root = FolderBuilder::default();
    for record in store.iter() {
        let segments: Vec<&str> = record.path.as_str()[1..].split('/').collect();
        let Some((leaf, folders)) = segments.split_last() else {
            continue;
        };
        let mut cursor = &mut root;
        for segment in folders {
            cursor = cursor.folders.entry((*segment).to_string()).or_default();
        }
        if !record.is_sentinel() {
            cursor
                .files
                .insert((*leaf).to_string(), (record.path.clone(), record.file_type));
        }
    }
    root.into_nodes(&VfsPath::root())
}

/// Display order of two paths: at the first differing segment, a folder
/// sorts before a file, otherwise segments compare by name.
pub fn tree_order(a: &str, b: &str) -> Ordering {
    let a_segments: Vec<&str> = a.trim_start_matches('/').split('/').collect();
    let b_segments: Vec<&str> = b.trim_start_matches('/').split('/').collect();
    for (i, (sa, sb)) in a_segments.iter().zip(&b_segments).enumerate() {
        let a_is_file = i + 1 == a_segments.len();
        let b_is_file = i + 1 == b_segments.len();
        if sa == sb && a_is_file == b_is_file {
            continue;
        }
        return match (a_is_file, b_is_file) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            _ => sa.cmp(sb),
        };
    }
    a_segments.len().cmp(&b_segments.len())
}
