//! Disk I/O for raw match payloads and tracking files.
//!
//! Every file is written to a `.part` sibling, synced, then renamed over the
//! final name, so readers never observe a half-written file.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::model::{MatchId, MatchSource};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `42.json` → `42.json.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Write `data` to `temp_path(path)`, sync, and rename it to `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tp = write_temp(path, |f| f.write_all(data).map_err(Into::into))?;
    commit(&tp, path)
}

/// Create the `.part` file for `path` and fill it with `fill`. Returns the temp path;
/// the caller finishes with `commit`.
pub(crate) fn write_temp<F>(path: &Path, fill: F) -> Result<PathBuf>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let tp = temp_path(path);
    let mut file =
        File::create(&tp).with_context(|| format!("create temp file: {}", tp.display()))?;
    fill(&mut file).with_context(|| format!("write temp file: {}", tp.display()))?;
    file.sync_all()
        .with_context(|| format!("sync temp file: {}", tp.display()))?;
    Ok(tp)
}

/// Rename a finished temp file over its final path.
pub(crate) fn commit(temp: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp, final_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp.display(),
            final_path.display()
        )
    })
}

/// Raw payload store: one `<match_id>.json` per match under the source's directory.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    layout: StorageConfig,
}

impl PayloadStore {
    pub fn new(layout: StorageConfig) -> Self {
        Self { layout }
    }

    pub fn path_for(&self, source: MatchSource, match_id: MatchId) -> PathBuf {
        self.layout
            .payload_dir(source)
            .join(format!("{}.json", match_id))
    }

    /// Persist a raw payload. Returns the number of bytes written.
    pub fn save(&self, source: MatchSource, match_id: MatchId, raw: &[u8]) -> Result<u64> {
        let path = self.path_for(source, match_id);
        write_atomic(&path, raw)?;
        tracing::debug!(match_id, path = %path.display(), bytes = raw.len(), "saved payload");
        Ok(raw.len() as u64)
    }
}
