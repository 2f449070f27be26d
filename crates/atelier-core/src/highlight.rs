//! Short-lived "recently changed" marks for the file tree.
//!
//! Expiry is evaluated against the `Instant` the caller passes in, so the
//! highlighter needs no timer task of its own; the set empties the first time
//! it is observed past its deadline.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::vfs::VfsPath;

#[derive(Debug, Clone)]
pub struct ChangeHighlighter {
    paths: BTreeSet<VfsPath>,
    expiry: Duration,
    deadline: Option<Instant>,
}

impl ChangeHighlighter {
    pub fn new(expiry: Duration) -> Self {
        Self {
            paths: BTreeSet::new(),
            expiry,
            deadline: None,
        }
    }

    /// Replace the set with `paths` and restart the expiry window from `now`.
    pub fn mark<'a>(&mut self, paths: impl IntoIterator<Item = &'a VfsPath>, now: Instant) {
        self.paths = paths.into_iter().cloned().collect();
        self.deadline = if self.paths.is_empty() {
            None
        } else {
            Some(now + self.expiry)
        };
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.deadline = None;
    }

    /// Clear the set if its window has passed. Returns true if it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    /// Paths highlighted at `now`.
    pub fn active(&mut self, now: Instant) -> &BTreeSet<VfsPath> {
        self.expire(now);
        &self.paths
    }

    /// True if `path` (or, for a folder, anything under it) is highlighted.
    pub fn is_highlighted(&mut self, path: &VfsPath, now: Instant) -> bool {
        self.active(now)
            .iter()
            .any(|marked| marked == path || marked.is_within(path))
    }
}
