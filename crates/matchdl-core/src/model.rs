//! Records kept in the tracking files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote match identifier.
pub type MatchId = i64;

/// Remote table a match was discovered in. Each source has its own payload directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Matches,
    PublicMatches,
}

impl MatchSource {
    /// Table name as used in explorer queries and tracking files.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchSource::Matches => "matches",
            MatchSource::PublicMatches => "public_matches",
        }
    }
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successfully ingested match (row of `downloaded_matches.csv`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedRecord {
    pub match_id: MatchId,
    pub start_time: i64,
    pub source: MatchSource,
    pub downloaded_time: DateTime<Utc>,
    pub file_size: u64,
    pub patch: u32,
}

/// Backlog entry lifecycle. `Skipped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklogStatus {
    Pending,
    Skipped,
}

/// One match waiting for deep processing (row of `parse_backlog.csv`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogEntry {
    pub match_id: MatchId,
    pub source: MatchSource,
    pub attempts: u32,
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub status: BacklogStatus,
    pub first_queued_time: DateTime<Utc>,
}

impl BacklogEntry {
    /// Entry for a match whose first fetch just came back not ready.
    /// The first attempt counts, so a fresh entry starts at one attempt.
    pub fn queued_after_first_attempt(
        match_id: MatchId,
        source: MatchSource,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Self {
        let mut entry = Self {
            match_id,
            source,
            attempts: 0,
            last_attempt_time: None,
            status: BacklogStatus::Pending,
            first_queued_time: now,
        };
        entry.record_failed_attempt(now, max_attempts);
        entry
    }

    pub fn is_pending(&self) -> bool {
        self.status == BacklogStatus::Pending
    }

    /// Count one more failed attempt. Returns true if the entry just became skipped.
    pub fn record_failed_attempt(&mut self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        if self.status == BacklogStatus::Skipped {
            return false;
        }
        self.attempts = (self.attempts + 1).min(max_attempts);
        self.last_attempt_time = Some(now);
        if self.attempts >= max_attempts {
            self.status = BacklogStatus::Skipped;
            return true;
        }
        false
    }
}
