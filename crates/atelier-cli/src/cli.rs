//! CLI argument parsing with clap.

use std::path::PathBuf;

use atelier_core::FileType;
use clap::{Parser, Subcommand};

/// atelier - edit a virtual web project and apply AI responses to it
#[derive(Parser, Debug)]
#[command(name = "atelier", version, about = "Edit a virtual web project and apply AI responses to it")]
pub struct Cli {
    /// Atelier home directory (overrides ATELIER_HOME and ~/.atelier)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Project to work on
    #[arg(short = 'p', long, global = true, default_value = "default")]
    pub project: String,

    /// Show debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List visible files
    Ls,
    /// Show the project as a tree
    Tree,
    /// Print a file's content
    Cat { path: String },
    /// Create or overwrite a file with content read from stdin
    Write {
        path: String,
        /// File type (html, css, js, ts, json, md, image, text); inferred from
        /// the extension when omitted
        #[arg(long = "type", value_parser = parse_file_type)]
        file_type: Option<FileType>,
    },
    /// Create an empty folder
    Mkdir { path: String },
    /// Move a file or folder
    Mv { from: String, to: String },
    /// Delete a file or folder
    Rm { path: String },
    /// Duplicate a file next to itself
    Cp { path: String },
    /// Stream an AI response (file or stdin) into the project
    Apply {
        file: Option<PathBuf>,
        /// Characters per simulated stream chunk
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u16).range(1..))]
        chunk_size: u16,
    },
    /// Manage checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointCommand,
    },
    /// Print the self-contained preview document for an HTML entry file
    Preview { entry: String },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CheckpointCommand {
    /// Snapshot the whole project
    Create { name: String },
    /// List checkpoints, newest first
    List,
    /// Replace the project with a checkpoint (files not in it are removed)
    Restore { id: String },
    /// Delete a checkpoint
    Delete { id: String },
    /// Show what changed since a checkpoint (or every file, without one)
    Diff { id: Option<String> },
}

/// Accepts the same type tags as the AI operation format.
fn parse_file_type(tag: &str) -> Result<FileType, String> {
    match serde_json::from_value::<FileType>(serde_json::Value::String(tag.to_ascii_lowercase())) {
        Ok(FileType::FolderMarker) => Err("use `atelier mkdir` to create folders".to_string()),
        Ok(file_type) => Ok(file_type),
        Err(_) => Err(format!("unknown file type '{}'", tag)),
    }
}
