//! atelier-core: project file store and AI patch pipeline for atelier
//!
//! Holds a project's files in an in-memory virtual file system, turns a
//! streamed AI response into file operations, applies them as one batch and
//! keeps named checkpoints of the whole project.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use atelier_core::backend::MemoryBackend;
//! use atelier_core::stream::{CancelFlag, CollectingSink};
//! use atelier_core::{Config, ProjectSession, TurnStatus};
//!
//! #[tokio::main]
//! async fn main() -> atelier_core::Result<()> {
//!     let backend = Arc::new(MemoryBackend::new());
//!     let mut session = ProjectSession::open("demo", backend, Config::default()).await?;
//!
//!     let response = "Added a page.\n```html\n<!-- /index.html -->\n<h1>Hi</h1>\n```\n";
//!     let chunks = futures_util::stream::iter(
//!         response.split_inclusive('\n').map(|c| Ok::<_, String>(c.to_string())),
//!     );
//!     let mut sink = CollectingSink::new();
//!     let report = session.run_turn(chunks, &CancelFlag::new(), &mut sink).await?;
//!
//!     assert_eq!(report.narrative, "Added a page.");
//!     assert!(matches!(report.status, TurnStatus::Applied { .. }));
//!     session.save_now().await?;
//!     Ok(())
//! }
//! ```
//!
//! For lower-level access (parsing without a session, applying patches to a
//! bare store), use the individual modules directly.

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod highlight;
pub mod patch;
pub mod preview;
pub mod safe_io;
mod session;
pub mod stream;
pub mod vfs;

pub use checkpoint::{Checkpoint, CheckpointManager, DiffEntry, DiffStatus};
pub use config::Config;
pub use error::{Error, Result};
pub use highlight::ChangeHighlighter;
pub use patch::{PatchOutcome, StreamOperation};
pub use session::{ProjectSession, TurnReport, TurnStatus};
pub use vfs::{FileRecord, FileType, VfsPath, VirtualFileStore};
