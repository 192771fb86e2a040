//! Single-writer guard for the tracking files.
//!
//! Two runs writing the same tracking directory would lose updates, so a run
//! holds an exclusive advisory lock on `<tracking_dir>/matchdl.lock` for its
//! whole duration. A second run fails fast instead of waiting.

use anyhow::{Context, Result};
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "matchdl.lock";

pub fn lock_path(tracking_dir: &Path) -> PathBuf {
    tracking_dir.join(LOCK_FILE)
}

/// Run `f` while holding the exclusive lock at `path`. The lock is released when `f` returns.
pub fn with_run_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create lock dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))?;

    let mut lock = RwLock::new(file);
    let _guard = match lock.try_write() {
        Ok(g) => g,
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            anyhow::bail!(
                "another run holds {}; only one run may write the tracking files at a time",
                path.display()
            )
        }
        Err(e) => {
            return Err(e).with_context(|| format!("lock {}", path.display()));
        }
    };
    tracing::debug!(path = %path.display(), "run lock acquired");
    f()
}
