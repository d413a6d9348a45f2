//! Plain-text key backups.
//!
//! Issued keys are written to a timestamped file under the backup
//! directory, one key per line, preceded by a commented header block.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::TailscaleResult;

/// Write `keys` to a timestamped backup file under `dir`.
///
/// Creating the directory is idempotent.  Returns the path of the file
/// written.
pub fn write_key_backup(keys: &[String], dir: &Path, expiry_days: u32) -> TailscaleResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let now = chrono::Local::now();
    let path = dir.join(format!("tailscale-keys-{}.txt", now.format("%Y%m%d-%H%M%S")));

    let mut contents = String::new();
    let _ = writeln!(contents, "# Tailscale auth keys");
    let _ = writeln!(contents, "# Generated: {}", now.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(contents, "# Total keys: {}", keys.len());
    let _ = writeln!(contents, "# Expiry: {expiry_days} days");
    let _ = writeln!(contents);
    for key in keys {
        let _ = writeln!(contents, "{key}");
    }

    std::fs::write(&path, contents)?;
    info!(path = %path.display(), count = keys.len(), "Keys backed up");
    Ok(path)
}
