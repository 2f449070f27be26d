//! One AI turn: drain the transport's chunk stream into the parser.
//!
//! The loop checks the cancellation flag before each chunk, appends it to the
//! buffer and pushes fresh derived views to the sink. No file is touched
//! here; the caller applies `TurnOutcome::operations` only when the whole
//! stream arrived and parsed.

use std::fmt::Display;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{Stream, StreamExt};
use log::{debug, info, warn};

use super::parser::StreamingPatchParser;
use super::sink::{StreamEvent, StreamSink};
use crate::error::{Error, Result};
use crate::patch::StreamOperation;

/// Status text shown in place of the narrative of a cancelled turn.
pub const CANCELLED_MESSAGE: &str = "Generation cancelled.";

/// Cooperative cancellation signal shared between the UI and a running turn.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a turn ended.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Prose to show the user. Replaced by [`CANCELLED_MESSAGE`] on cancel.
    pub narrative: String,
    /// The operations to apply, or why there are none to apply:
    /// `StreamCancelled`, `StreamTransport`, `StreamTruncated` or
    /// `MalformedPatch`.
    /// An empty list means the response was pure explanation.
    pub operations: Result<Vec<StreamOperation>>,
    /// True if the response outgrew the buffer limit.
    pub truncated: bool,
    /// The complete response buffer.
    pub full_text: String,
}

/// Consume `chunks` until it ends, fails or `cancel` is raised.
///
/// Sink failures are the only hard errors; everything about the stream
/// itself is reported through the outcome.
pub async fn run_turn<S, E, K>(
    mut chunks: S,
    cancel: &CancelFlag,
    max_bytes: usize,
    sink: &mut K,
) -> io::Result<TurnOutcome>
where
    S: Stream<Item = std::result::Result<String, E>> + Unpin,
    E: Display,
    K: StreamSink + ?Sized,
{
    let mut parser = StreamingPatchParser::new(max_bytes);
    let mut chunk_count = 0usize;

    let failure = loop {
        if cancel.is_cancelled() {
            break Some(Error::StreamCancelled);
        }
        let Some(next) = chunks.next().await else {
            break None;
        };
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(e) => break Some(Error::StreamTransport(e.to_string())),
        };
        chunk_count += 1;

        let was_truncated = parser.is_truncated();
        if parser.push(&chunk) {
            let view = parser.view();
            sink.handle(StreamEvent::Progress(&view))?;
        } else if !was_truncated {
            sink.handle(StreamEvent::Truncated { limit: max_bytes })?;
        }
    };
    sink.handle(StreamEvent::Finished)?;

    let truncated = parser.is_truncated();
    let full_text = parser.full_text().to_string();
    let outcome = match failure {
        Some(Error::StreamCancelled) => {
            info!("turn cancelled after {} chunk(s)", chunk_count);
            TurnOutcome {
                narrative: CANCELLED_MESSAGE.to_string(),
                operations: Err(Error::StreamCancelled),
                truncated,
                full_text,
            }
        }
        Some(error) => {
            warn!("turn failed after {} chunk(s): {}", chunk_count, error);
            TurnOutcome {
                narrative: parser.view().narrative,
                operations: Err(error),
                truncated,
                full_text,
            }
        }
        None => {
            debug!("turn finished: {} chunk(s), {} bytes", chunk_count, full_text.len());
            TurnOutcome {
                narrative: parser.view().narrative,
                operations: parser.final_operations(),
                truncated,
                full_text,
            }
        }
    };
    Ok(outcome)
}
