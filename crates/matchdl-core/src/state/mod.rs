//! Persistent ingestion state: the downloaded set and the parse backlog.
//!
//! Both live as CSV files with a header row in the tracking directory. This
//! module is the only place that touches raw rows; the rest of the crate sees
//! typed records. A file that exists but does not parse is fatal for the run.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::model::{BacklogEntry, DownloadedRecord, MatchId};
use crate::storage::{commit, write_temp};

pub const DOWNLOADED_FILE: &str = "downloaded_matches.csv";
pub const BACKLOG_FILE: &str = "parse_backlog.csv";

pub const DOWNLOADED_HEADER: [&str; 6] = [
    "match_id",
    "start_time",
    "source",
    "downloaded_time",
    "file_size",
    "patch",
];

pub const BACKLOG_HEADER: [&str; 6] = [
    "match_id",
    "source",
    "attempts",
    "last_attempt_time",
    "status",
    "first_queued_time",
];

/// Both record sets as loaded from (or about to be written to) disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestState {
    pub downloaded: Vec<DownloadedRecord>,
    pub backlog: Vec<BacklogEntry>,
}

/// Loads and saves the tracking files in one directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(tracking_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: tracking_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn downloaded_path(&self) -> PathBuf {
        self.dir.join(DOWNLOADED_FILE)
    }

    pub fn backlog_path(&self) -> PathBuf {
        self.dir.join(BACKLOG_FILE)
    }

    /// Load both sets. Missing files are empty sets (first run).
    pub fn load(&self) -> Result<IngestState> {
        let downloaded: Vec<DownloadedRecord> =
            read_rows(&self.downloaded_path(), &DOWNLOADED_HEADER)?;
        ensure_unique(&self.downloaded_path(), downloaded.iter().map(|r| r.match_id))?;

        let mut backlog: Vec<BacklogEntry> = read_rows(&self.backlog_path(), &BACKLOG_HEADER)?;
        ensure_unique(&self.backlog_path(), backlog.iter().map(|e| e.match_id))?;

        // An interrupted save can leave a match in both files; the download wins.
        let done: HashSet<MatchId> = downloaded.iter().map(|r| r.match_id).collect();
        let before = backlog.len();
        backlog.retain(|e| !done.contains(&e.match_id));
        if backlog.len() != before {
            tracing::warn!(
                dropped = before - backlog.len(),
                "dropped backlog entries already present in the downloaded set"
            );
        }

        tracing::info!(
            downloaded = downloaded.len(),
            backlog = backlog.len(),
            "loaded state from {}",
            self.dir.display()
        );
        Ok(IngestState {
            downloaded,
            backlog,
        })
    }

    /// Rewrite both files. Both are fully written to `.part` files before either is
    /// renamed into place, so a failure never leaves a truncated file behind.
    pub fn save(&self, state: &IngestState) -> Result<()> {
        let downloaded_path = self.downloaded_path();
        let backlog_path = self.backlog_path();

        let downloaded_tmp = write_temp(&downloaded_path, |f| {
            write_rows(f, &DOWNLOADED_HEADER, &state.downloaded)
        })?;
        let backlog_tmp = write_temp(&backlog_path, |f| {
            write_rows(f, &BACKLOG_HEADER, &state.backlog)
        })?;
        commit(&downloaded_tmp, &downloaded_path)?;
        commit(&backlog_tmp, &backlog_path)?;

        tracing::info!(
            downloaded = state.downloaded.len(),
            backlog = state.backlog.len(),
            "saved state to {}",
            self.dir.display()
        );
        Ok(())
    }
}

/// Every match id already known, downloaded or queued. Discovery must never return these.
pub fn exclusion_set(downloaded: &[DownloadedRecord], backlog: &[BacklogEntry]) -> HashSet<MatchId> {
    downloaded
        .iter()
        .map(|r| r.match_id)
        .chain(backlog.iter().map(|e| e.match_id))
        .collect()
}

/// Ids the discovery query itself has to exclude for `floor`: every backlog entry
/// (their start time is not tracked) and downloaded matches newer than the floor.
/// Older downloads are already ruled out by `start_time > floor`, so leaving them
/// out keeps the query from growing with the whole history.
pub fn query_exclusions(
    downloaded: &[DownloadedRecord],
    backlog: &[BacklogEntry],
    floor: i64,
) -> HashSet<MatchId> {
    downloaded
        .iter()
        .filter(|r| r.start_time > floor)
        .map(|r| r.match_id)
        .chain(backlog.iter().map(|e| e.match_id))
        .collect()
}

/// Earliest start time already covered for the most recent patch seen in the
/// downloaded set. `None` when nothing is downloaded; the caller supplies a default.
pub fn resume_floor(downloaded: &[DownloadedRecord]) -> Option<i64> {
    let current_patch = downloaded.iter().map(|r| r.patch).max()?;
    downloaded
        .iter()
        .filter(|r| r.patch == current_patch)
        .map(|r| r.start_time)
        .min()
}

fn read_rows<T: DeserializeOwned>(path: &Path, header: &[&str]) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("no tracking file at {}, starting empty", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("open tracking file: {}", path.display())),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let found = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    for column in header {
        if !found.iter().any(|h| h == *column) {
            anyhow::bail!(
                "tracking file {} is missing column {:?} (found: {})",
                path.display(),
                column,
                found.iter().collect::<Vec<_>>().join(",")
            );
        }
    }

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let row: T = row.with_context(|| format!("parse tracking file: {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_rows<T: Serialize>(file: &mut File, header: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn ensure_unique(path: &Path, ids: impl Iterator<Item = MatchId>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            anyhow::bail!("tracking file {} lists match {} twice", path.display(), id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
