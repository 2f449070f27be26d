use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs_next::home_dir;
use log::warn;
use serde::{Deserialize, Serialize};

/// Name of the config file inside the atelier home directory.
pub const CONFIG_FILE: &str = "config.toml";

const SUMMARY_MAX_CHARS: usize = 60;

/// Resolve the atelier home directory.
///
/// Precedence:
/// 1. `home_override` (from the `--home` CLI flag)
/// 2. `ATELIER_HOME` environment variable
/// 3. `~/.atelier`
pub fn resolve_home(home_override: Option<PathBuf>) -> io::Result<PathBuf> {
    if let Some(path) = home_override {
        return Ok(path);
    }
    if let Ok(home) = std::env::var("ATELIER_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home =
        home_dir().ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Home directory not found"))?;
    Ok(home.join(".atelier"))
}

/// Settings from `<home>/config.toml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long changed paths stay highlighted.
    pub highlight_expiry_ms: u64,
    /// Quiet period after the last edit before the project is saved.
    pub save_debounce_ms: u64,
    /// Upper bound on one AI response buffer.
    pub max_stream_bytes: usize,
    /// Take a checkpoint after every successfully applied AI patch.
    pub auto_checkpoint: bool,
    /// Name for automatic checkpoints; `{summary}` is filled in.
    pub checkpoint_name_template: String,
    /// Where `LocalBackend` keeps projects. Defaults to `<home>/projects`.
    pub projects_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            highlight_expiry_ms: 4000,
            save_debounce_ms: 1500,
            max_stream_bytes: 1024 * 1024,
            auto_checkpoint: true,
            checkpoint_name_template: "AI: {summary}".to_string(),
            projects_dir: None,
        }
    }
}

impl Config {
    /// Load config from `<home>/config.toml`, falling back to defaults when
    /// the file is missing or does not parse.
    pub fn load(home: &Path) -> Self {
        let path = home.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!("config parse error in {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn highlight_expiry(&self) -> Duration {
        Duration::from_millis(self.highlight_expiry_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn projects_dir(&self, home: &Path) -> PathBuf {
        self.projects_dir
            .clone()
            .unwrap_or_else(|| home.join("projects"))
    }

    /// Name for an automatic checkpoint after a turn with this narrative.
    pub fn checkpoint_name(&self, narrative: &str) -> String {
        let first_line = narrative
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("update");
        let summary: String = if first_line.chars().count() > SUMMARY_MAX_CHARS {
            let cut: String = first_line.chars().take(SUMMARY_MAX_CHARS - 3).collect();
            format!("{}...", cut.trim_end())
        } else {
            first_line.to_string()
        };
        self.checkpoint_name_template.replace("{summary}", &summary)
    }
}
