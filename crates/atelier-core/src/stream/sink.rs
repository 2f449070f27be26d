//! Stream sink abstraction for decoupling the parser from presentation.
//!
//! The turn loop emits a `StreamEvent` after every chunk; the chat consumer
//! decides how to render it (terminal status line, JSON, nothing at all).

use std::io;

use super::parser::StreamView;
use crate::vfs::VfsPath;

/// Events emitted while an AI response streams in.
#[derive(Debug, Clone)]
pub enum StreamEvent<'a> {
    /// Derived views recomputed after a chunk was appended.
    Progress(&'a StreamView),

    /// The buffer limit was reached; later chunks are ignored.
    Truncated { limit: usize },

    /// The stream ended (normally, by cancellation or by transport failure).
    Finished,
}

/// Trait for handling stream events during an AI turn.
///
/// # Example
///
/// ```
/// use atelier_core::stream::{StreamEvent, StreamSink};
/// use std::io;
///
/// struct CountingSink {
///     updates: usize,
/// }
///
/// impl StreamSink for CountingSink {
///     fn handle(&mut self, event: StreamEvent<'_>) -> io::Result<()> {
///         if let StreamEvent::Progress(_) = event {
///             self.updates += 1;
///         }
///         Ok(())
///     }
/// }
///
/// let mut sink = CountingSink { updates: 0 };
/// sink.handle(StreamEvent::Finished).unwrap();
/// assert_eq!(sink.updates, 0);
/// ```
pub trait StreamSink {
    /// Handle a stream event.
    fn handle(&mut self, event: StreamEvent<'_>) -> io::Result<()>;
}

/// A sink that records what it saw, for tests and programmatic callers.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Number of progress updates received.
    pub updates: usize,
    /// Most recent derived views.
    pub last_view: Option<StreamView>,
    /// Files seen as the live block, in the order generation started.
    pub live_files: Vec<VfsPath>,
    pub truncated: bool,
    pub finished: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamSink for CollectingSink {
    fn handle(&mut self, event: StreamEvent<'_>) -> io::Result<()> {
        match event {
            StreamEvent::Progress(view) => {
                self.updates += 1;
                if let Some(live) = &view.live_block
                    && self.live_files.last() != Some(&live.current_file)
                {
                    self.live_files.push(live.current_file.clone());
                }
                self.last_view = Some(view.clone());
            }
            StreamEvent::Truncated { .. } => self.truncated = true,
            StreamEvent::Finished => self.finished = true,
        }
        Ok(())
    }
}
