mod cli;
mod output;

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use atelier_core::backend::{LocalBackend, ProjectBackend};
use atelier_core::config::{self, Config};
use atelier_core::stream::CancelFlag;
use atelier_core::{Error, ProjectSession, TurnStatus, VfsPath, preview, vfs};
use clap::Parser;
use log::debug;

use crate::cli::{CheckpointCommand, Cli, Command};
use crate::output::StatusSink;

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn vpath(raw: &str) -> io::Result<VfsPath> {
    Ok(VfsPath::new(raw)?)
}

fn read_input(file: Option<&Path>) -> io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to read file '{}': {}", path.display(), e),
            )
        }),
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

/// Split `text` into chunks of `size` characters, the way a transport would
/// deliver it.
fn simulate_chunks(text: &str, size: usize) -> Vec<io::Result<String>> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| Ok(chunk.iter().collect()))
        .collect()
}

async fn apply_response(
    session: &mut ProjectSession,
    file: Option<&Path>,
    chunk_size: usize,
) -> io::Result<()> {
    let text = read_input(file)?;
    let chunks = futures_util::stream::iter(simulate_chunks(&text, chunk_size));
    let mut sink = StatusSink::new(io::stderr());
    let report = session
        .run_turn(chunks, &CancelFlag::new(), &mut sink)
        .await?;

    if !report.narrative.is_empty() {
        println!("{}", report.narrative);
    }
    if report.truncated {
        eprintln!("[warning: response was truncated before it ended]");
    }

    match report.status {
        TurnStatus::Applied {
            affected_paths,
            checkpoint,
            summary,
            ..
        } => {
            session.save_now().await?;
            println!();
            for path in &affected_paths {
                println!("  {}", path);
            }
            eprintln!(
                "[applied: {} written, {} folder(s), {} deleted, {} skipped]",
                summary.files_written,
                summary.folders_ensured,
                summary.paths_deleted,
                summary.skipped
            );
            if let Some(id) = checkpoint {
                eprintln!("[checkpoint {}]", &id.to_string()[..8]);
            }
            Ok(())
        }
        TurnStatus::NoChanges => {
            eprintln!("[no file changes]");
            Ok(())
        }
        TurnStatus::Failed(Error::MalformedPatch { raw, reason }) => {
            eprintln!("[malformed patch, nothing applied: {}]", reason);
            println!("{}", raw);
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed patch: {}", reason),
            ))
        }
        TurnStatus::Failed(e) => Err(e.into()),
    }
}

async fn run_checkpoint(session: &mut ProjectSession, action: CheckpointCommand) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match action {
        CheckpointCommand::Create { name } => {
            let id = session.create_checkpoint(&name).await?;
            writeln!(stdout, "{}", id)?;
        }
        CheckpointCommand::List => output::write_checkpoints(&mut stdout, session.checkpoints())?,
        CheckpointCommand::Restore { id } => {
            let id = session.find_checkpoint(&id)?.id;
            let restored = session.restore_checkpoint(&id)?;
            session.save_now().await?;
            writeln!(stdout, "restored {} file(s)", restored.len())?;
        }
        CheckpointCommand::Delete { id } => {
            let id = session.find_checkpoint(&id)?.id;
            session.delete_checkpoint(&id).await?;
        }
        CheckpointCommand::Diff { id } => {
            let id = match id {
                Some(id) => Some(session.find_checkpoint(&id)?.id),
                None => None,
            };
            output::write_diff(&mut stdout, &session.diff(id.as_ref())?)?;
        }
    }
    Ok(())
}

async fn run(session: &mut ProjectSession, command: Command) -> io::Result<()> {
    match command {
        Command::Ls => {
            for record in session.store().list_visible() {
                println!("{:<10} {}", record.file_type.as_str(), record.path);
            }
        }
        Command::Tree => {
            output::write_tree(&mut io::stdout().lock(), &vfs::tree::build(session.store()))?;
        }
        Command::Cat { path } => {
            let path = vpath(&path)?;
            let record = session
                .store()
                .get(&path)
                .filter(|r| !r.is_sentinel())
                .ok_or_else(|| io::Error::from(Error::NotFound { path: path.to_string() }))?;
            print!("{}", record.content);
        }
        Command::Write { path, file_type } => {
            let path = vpath(&path)?;
            let content = read_input(None)?;
            session.write_file(&path, file_type, &content)?;
            session.save_now().await?;
        }
        Command::Mkdir { path } => {
            session.create_folder(&vpath(&path)?)?;
            session.save_now().await?;
        }
        Command::Mv { from, to } => {
            session.rename(&vpath(&from)?, &vpath(&to)?)?;
            session.save_now().await?;
        }
        Command::Rm { path } => {
            let removed = session.delete(&vpath(&path)?)?;
            session.save_now().await?;
            debug!("removed {} entries", removed.len());
        }
        Command::Cp { path } => {
            let copy = session.duplicate(&vpath(&path)?)?;
            session.save_now().await?;
            println!("{}", copy);
        }
        Command::Apply { file, chunk_size } => {
            apply_response(session, file.as_deref(), usize::from(chunk_size)).await?;
        }
        Command::Checkpoint { action } => run_checkpoint(session, action).await?,
        Command::Preview { entry } => {
            let html = preview::render(session.store(), &vpath(&entry)?)?;
            println!("{}", html);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let home = config::resolve_home(cli.home)?;
    let config = Config::load(&home);
    let backend: Arc<dyn ProjectBackend> = Arc::new(LocalBackend::new(config.projects_dir(&home)));
    debug!("home {}, project '{}'", home.display(), cli.project);

    let mut session = ProjectSession::open(&cli.project, backend, config).await?;
    run(&mut session, cli.command).await
}
