//! Retry pass over the parse backlog.
//!
//! Pending entries are retried oldest first (by first-queued time) so a
//! shared budget cannot starve old entries. Each failed retry counts an
//! attempt; reaching the maximum moves the entry to `skipped`, which is
//! terminal and never retried by later runs.

use chrono::Utc;
use std::collections::HashSet;

use crate::api::MatchApi;
use crate::budget::BudgetTracker;
use crate::classifier::{Classifier, Outcome};
use crate::model::{BacklogEntry, BacklogStatus, DownloadedRecord, MatchId};

/// What one backlog pass did.
#[derive(Debug, Default)]
pub struct BacklogOutcome {
    /// Entries that stay in the backlog (pending and skipped), in their original order.
    pub backlog: Vec<BacklogEntry>,
    pub newly_downloaded: Vec<DownloadedRecord>,
    pub newly_skipped: Vec<MatchId>,
    /// Retried, failed again, still pending.
    pub retried: Vec<MatchId>,
    /// Pending entries left untouched because the budget ran out.
    pub not_attempted: Vec<MatchId>,
    pub not_found: usize,
    pub transient_errors: usize,
    /// Fatal local error that stopped the pass. Progress above is still valid.
    pub aborted: Option<anyhow::Error>,
}

impl BacklogOutcome {
    pub fn still_pending(&self) -> impl Iterator<Item = &BacklogEntry> {
        self.backlog.iter().filter(|e| e.is_pending())
    }
}

/// Indices of `entries` in retry order: oldest first-queued time first, ties by id.
fn retry_order(entries: &[BacklogEntry]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&entries[a], &entries[b]);
        a.first_queued_time
            .cmp(&b.first_queued_time)
            .then(a.match_id.cmp(&b.match_id))
    });
    order
}

#[derive(Debug, Clone, Copy)]
pub struct BacklogManager {
    max_attempts: u32,
}

impl BacklogManager {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pending entries a run with `budget_remaining` calls would retry, in retry order.
    /// Each retry costs at least one call. No remote calls, no mutation.
    pub fn select_for_retry(&self, entries: &[BacklogEntry], budget_remaining: u32) -> Vec<MatchId> {
        retry_order(entries)
            .into_iter()
            .map(|i| &entries[i])
            .filter(|e| e.is_pending() && e.attempts < self.max_attempts)
            .take(budget_remaining as usize)
            .map(|e| e.match_id)
            .collect()
    }

    /// Retry every pending entry while the budget lasts.
    pub fn process<A: MatchApi>(
        &self,
        classifier: &Classifier,
        api: &mut A,
        budget: &mut BudgetTracker,
        mut entries: Vec<BacklogEntry>,
    ) -> BacklogOutcome {
        let mut out = BacklogOutcome::default();
        let mut downloaded: HashSet<usize> = HashSet::new();
        let pending = entries.iter().filter(|e| e.is_pending()).count();
        if pending == 0 {
            tracing::info!("no pending matches in parse backlog");
        } else {
            tracing::info!(pending, "processing parse backlog");
        }

        for idx in retry_order(&entries) {
            let entry = &mut entries[idx];
            if !entry.is_pending() {
                continue;
            }
            let match_id = entry.match_id;

            if entry.attempts >= self.max_attempts {
                // Over the limit already (hand-edited file or lowered max): no more calls.
                entry.status = BacklogStatus::Skipped;
                entry.attempts = self.max_attempts;
                tracing::info!(match_id, "backlog entry exhausted, marking skipped");
                out.newly_skipped.push(match_id);
                continue;
            }
            if out.aborted.is_some() || budget.is_exhausted() {
                out.not_attempted.push(match_id);
                continue;
            }

            let outcome = match classifier.fetch_and_classify(api, budget, match_id, entry.source, None) {
                Ok(o) => o,
                Err(e) => {
                    tracing::error!(match_id, "backlog pass stopped: {:#}", e);
                    out.aborted = Some(e);
                    out.not_attempted.push(match_id);
                    continue;
                }
            };

            match outcome {
                Outcome::Downloaded { record } => {
                    tracing::info!(match_id, "backlog match downloaded");
                    out.newly_downloaded.push(record);
                    downloaded.insert(idx);
                }
                Outcome::NotAttempted => out.not_attempted.push(match_id),
                failed => {
                    match failed {
                        Outcome::NotFound => out.not_found += 1,
                        Outcome::TransientError(_) => out.transient_errors += 1,
                        _ => {}
                    }
                    if entry.record_failed_attempt(Utc::now(), self.max_attempts) {
                        tracing::info!(
                            match_id,
                            attempts = entry.attempts,
                            "marking match as skipped after max attempts"
                        );
                        out.newly_skipped.push(match_id);
                    } else {
                        out.retried.push(match_id);
                    }
                }
            }
        }

        out.backlog = entries
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !downloaded.contains(i))
            .map(|(_, e)| e)
            .collect();
        tracing::info!(
            downloaded = out.newly_downloaded.len(),
            skipped = out.newly_skipped.len(),
            not_attempted = out.not_attempted.len(),
            remaining = out.backlog.len(),
            "backlog pass finished"
        );
        out
    }
}

impl Default for BacklogManager {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}
