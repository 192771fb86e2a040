//! Fetch one match and decide what to do with it.
//!
//! A deep-processed record is written to the payload store and becomes a
//! `DownloadedRecord`. A record that is not processed yet triggers a
//! best-effort parse request; the backlog takes care of coming back later.

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;

use crate::api::{ApiError, MatchApi};
use crate::budget::BudgetTracker;
use crate::model::{DownloadedRecord, MatchId, MatchSource};
use crate::storage::PayloadStore;

/// Result of one fetch-and-classify attempt.
#[derive(Debug)]
pub enum Outcome {
    /// Deep-processed record, already persisted.
    Downloaded { record: DownloadedRecord },
    /// Found but not processed yet; a parse request was sent if the budget allowed.
    NeedsProcessing,
    /// Remote does not have the match yet (usually ingestion lag).
    NotFound,
    /// The fetch failed; counts as a failed attempt.
    TransientError(ApiError),
    /// No budget left for the fetch; nothing was called.
    NotAttempted,
}

impl Outcome {
    /// True for outcomes that should be (re)queued in the backlog.
    pub fn is_failed_attempt(&self) -> bool {
        matches!(
            self,
            Outcome::NeedsProcessing | Outcome::NotFound | Outcome::TransientError(_)
        )
    }
}

/// Fields of the match record the classifier looks at.
#[derive(Debug, Deserialize)]
struct MatchSummary {
    #[serde(default)]
    match_id: Option<MatchId>,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    patch: Option<u32>,
    #[serde(default)]
    od_data: Option<OdData>,
}

#[derive(Debug, Deserialize)]
struct OdData {
    #[serde(default)]
    has_parsed: Option<bool>,
}

impl MatchSummary {
    fn is_parsed(&self) -> bool {
        self.od_data
            .as_ref()
            .and_then(|d| d.has_parsed)
            .unwrap_or(false)
    }
}

pub struct Classifier {
    payloads: PayloadStore,
}

impl Classifier {
    pub fn new(payloads: PayloadStore) -> Self {
        Self { payloads }
    }

    /// Fetch `match_id` and classify it. Costs one call, plus one more for the
    /// parse request when the match is not processed yet.
    ///
    /// `known_start_time` fills in the record when the payload lacks `start_time`.
    /// Errors are local I/O failures writing the payload; remote failures are outcomes.
    pub fn fetch_and_classify<A: MatchApi>(
        &self,
        api: &mut A,
        budget: &mut BudgetTracker,
        match_id: MatchId,
        source: MatchSource,
        known_start_time: Option<i64>,
    ) -> Result<Outcome> {
        if !budget.consume(1) {
            return Ok(Outcome::NotAttempted);
        }

        let raw = match api.fetch_match(match_id) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::info!(match_id, "match not found (not ingested remotely yet)");
                return Ok(Outcome::NotFound);
            }
            Err(e) => {
                tracing::warn!(match_id, kind = e.kind(), "fetch failed: {}", e);
                return Ok(Outcome::TransientError(e));
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            tracing::info!(match_id, "empty response, treating as not found");
            return Ok(Outcome::NotFound);
        }
        let summary: MatchSummary = match serde_json::from_slice(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(match_id, "invalid match JSON: {}", e);
                return Ok(Outcome::TransientError(ApiError::Decode(e.to_string())));
            }
        };
        match summary.match_id {
            None => {
                tracing::info!(match_id, "response has no match_id, treating as not found");
                return Ok(Outcome::NotFound);
            }
            Some(id) if id != match_id => {
                tracing::warn!(match_id, got = id, "response is for a different match");
                return Ok(Outcome::TransientError(ApiError::Decode(format!(
                    "asked for match {}, got {}",
                    match_id, id
                ))));
            }
            Some(_) => {}
        }

        if !summary.is_parsed() {
            tracing::info!(match_id, "match is not parsed yet");
            self.request_parse(api, budget, match_id);
            return Ok(Outcome::NeedsProcessing);
        }

        let file_size = self.payloads.save(source, match_id, &raw)?;
        let record = DownloadedRecord {
            match_id,
            start_time: summary.start_time.or(known_start_time).unwrap_or(0),
            source,
            downloaded_time: Utc::now(),
            file_size,
            patch: summary.patch.unwrap_or(0),
        };
        tracing::info!(
            match_id,
            patch = record.patch,
            bytes = file_size,
            "downloaded parsed match"
        );
        Ok(Outcome::Downloaded { record })
    }

    /// Ask the remote to parse the match. Failures only get logged; the backlog retries.
    fn request_parse<A: MatchApi>(&self, api: &mut A, budget: &mut BudgetTracker, match_id: MatchId) {
        if !budget.consume(1) {
            tracing::warn!(match_id, "no budget left for parse request");
            return;
        }
        match api.request_parse(match_id) {
            Ok(()) => tracing::info!(match_id, "parse request sent"),
            Err(e) => tracing::warn!(match_id, kind = e.kind(), "parse request failed: {}", e),
        }
    }
}
