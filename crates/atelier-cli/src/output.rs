//! Terminal rendering: live generation status on stderr, and plain-text
//! listings for stdout.

use std::io::{self, Write};

use atelier_core::stream::{StreamEvent, StreamSink};
use atelier_core::vfs::tree::TreeNode;
use atelier_core::{Checkpoint, DiffEntry, VfsPath};

/// Writes one status line whenever generation moves on to a new file.
pub struct StatusSink<W: Write> {
    out: W,
    current: Option<VfsPath>,
    generated: usize,
}

impl<W: Write> StatusSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            current: None,
            generated: 0,
        }
    }
}

impl<W: Write> StreamSink for StatusSink<W> {
    fn handle(&mut self, event: StreamEvent<'_>) -> io::Result<()> {
        match event {
            StreamEvent::Progress(view) => {
                let live = view.live_block.as_ref().map(|b| &b.current_file);
                if live.is_some() && live != self.current.as_ref() {
                    self.current = live.cloned();
                    self.generated += 1;
                    if let Some(path) = &self.current {
                        writeln!(self.out, "[generating {}]", path)?;
                    }
                }
            }
            StreamEvent::Truncated { limit } => {
                writeln!(
                    self.out,
                    "[response exceeded {} bytes; the rest is ignored]",
                    limit
                )?;
            }
            StreamEvent::Finished => {
                if self.generated > 0 {
                    writeln!(self.out, "[stream finished: {} file block(s)]", self.generated)?;
                }
            }
        }
        self.out.flush()
    }
}

/// Indented tree, folders with a trailing `/`.
pub fn write_tree(out: &mut impl Write, nodes: &[TreeNode]) -> io::Result<()> {
    fn walk(out: &mut impl Write, nodes: &[TreeNode], depth: usize) -> io::Result<()> {
        for node in nodes {
            let indent = "  ".repeat(depth);
            match node {
                TreeNode::Folder { name, children, .. } => {
                    writeln!(out, "{}{}/", indent, name)?;
                    walk(out, children, depth + 1)?;
                }
                TreeNode::File { name, .. } => writeln!(out, "{}{}", indent, name)?,
            }
        }
        Ok(())
    }
    walk(out, nodes, 0)
}

pub fn write_checkpoints(out: &mut impl Write, checkpoints: &[Checkpoint]) -> io::Result<()> {
    if checkpoints.is_empty() {
        return writeln!(out, "(no checkpoints)");
    }
    for checkpoint in checkpoints {
        let id = checkpoint.id.to_string();
        writeln!(
            out,
            "{}  {}  {}  ({} files)",
            &id[..8],
            checkpoint.created_at.format("%Y-%m-%d %H:%M:%S"),
            checkpoint.name,
            checkpoint.visible_len()
        )?;
    }
    Ok(())
}

pub fn write_diff(out: &mut impl Write, entries: &[DiffEntry]) -> io::Result<()> {
    if entries.is_empty() {
        return writeln!(out, "(no changes)");
    }
    for entry in entries {
        writeln!(out, "{} {}", entry.status.marker(), entry.path)?;
    }
    Ok(())
}
