//! Atomic file writes for the on-disk backend.
//!
//! A write goes to a `.tmp` sibling, is fsynced, then renamed over the
//! target, so a project file is either the old version or the new one.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Atomically write bytes, creating parent directories as needed.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(contents)?;
        writer.flush()?;
    }
    file.sync_all()?;

    fs::rename(&tmp_path, path)
}
