//! One ingestion run, start to finish.
//!
//! The run is a fixed sequence over a single thread:
//!
//! 1. load the tracking files, derive the resume floor and exclusion set;
//! 2. retry the parse backlog (oldest first) while the budget lasts;
//! 3. with what is left, discover new matches and classify each one;
//! 4. save both tracking files, whatever happened in 2 and 3.
//!
//! Remote failures never abort the run. Budget exhaustion just stops new
//! calls. Only local errors (unreadable state, unwritable payloads) are fatal,
//! and even then progress made so far is saved first.

use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;

use crate::api::MatchApi;
use crate::backlog::BacklogManager;
use crate::budget::BudgetTracker;
use crate::classifier::{Classifier, Outcome};
use crate::config::MatchdlConfig;
use crate::discovery::Discoverer;
use crate::model::{BacklogEntry, DownloadedRecord, MatchId};
use crate::state::{exclusion_set, query_exclusions, resume_floor, IngestState, StateStore};
use crate::storage::PayloadStore;


/// Per-invocation knobs (CLI flags, defaulting to the config).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Ceiling on remote calls for this run.
    pub api_limit: u32,
    /// Max candidates per discovery query.
    pub batch_size: u32,
    /// Report what would happen; no remote calls, no writes.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn from_config(cfg: &MatchdlConfig) -> Self {
        Self {
            api_limit: cfg.budget.daily_api_limit,
            batch_size: cfg.discovery.batch_size,
            dry_run: false,
        }
    }
}

/// What a dry run would have done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DryRunReport {
    /// Pending backlog ids that would be retried, oldest first, capped by the budget.
    pub would_retry: Vec<MatchId>,
    /// Discovery SQL, when the floor is known without asking the remote.
    pub discovery_query: Option<String>,
    pub batch_size: u32,
}

/// Counts for one run. Every candidate considered ends up in exactly one of
/// downloaded, queued (pending or skipped) or not attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub backlog_downloaded: usize,
    pub new_downloaded: usize,
    /// Discovered matches appended to the backlog.
    pub newly_queued: usize,
    /// Pending backlog entries after the run.
    pub still_pending: usize,
    pub newly_skipped: Vec<MatchId>,
    pub not_attempted: Vec<MatchId>,
    pub not_found: usize,
    pub transient_errors: usize,
    pub discovered: usize,
    pub discovery_failed: bool,
    pub calls_used: u32,
    pub ceiling: u32,
    pub remaining: u32,
    pub total_downloaded: usize,
    pub total_backlog: usize,
    pub dry_run: Option<DryRunReport>,
}

impl RunSummary {
    pub fn downloaded(&self) -> usize {
        self.backlog_downloaded + self.new_downloaded
    }

    fn finish(&mut self, budget: &BudgetTracker, state: &IngestState) {
        self.calls_used = budget.used();
        self.ceiling = budget.ceiling();
        self.remaining = budget.remaining();
        self.still_pending = state.backlog.iter().filter(|e| e.is_pending()).count();
        self.total_downloaded = state.downloaded.len();
        self.total_backlog = state.backlog.len();
    }
}

/// Owns the components of a run and the remote API handle.
pub struct Pipeline<A: MatchApi> {
    config: MatchdlConfig,
    api: A,
    store: StateStore,
    classifier: Classifier,
    backlog: BacklogManager,
    discoverer: Discoverer,
}

impl<A: MatchApi> Pipeline<A> {
    /// Fails on an unusable configuration, before anything touches disk or network.
    pub fn new(config: MatchdlConfig, api: A) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: StateStore::new(config.storage.tracking_dir.clone()),
            classifier: Classifier::new(PayloadStore::new(config.storage.clone())),
            backlog: BacklogManager::new(config.backlog.max_attempts),
            discoverer: Discoverer::new(config.discovery.clone()),
            config,
            api,
        })
    }

    pub fn config(&self) -> &MatchdlConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn into_api(self) -> A {
        self.api
    }

    pub fn run(&mut self, opts: RunOptions) -> Result<RunSummary> {
        let state = self.store.load()?;
        if opts.dry_run {
            return Ok(self.dry_run(&state, opts));
        }

        tracing::info!(
            ceiling = opts.api_limit,
            batch_size = opts.batch_size,
            downloaded = state.downloaded.len(),
            backlog = state.backlog.len(),
            "starting run"
        );
        let floor = resume_floor(&state.downloaded);
        let exclude = exclusion_set(&state.downloaded, &state.backlog);
        let mut budget = BudgetTracker::new(opts.api_limit);
        let mut summary = RunSummary::default();
        let IngestState {
            mut downloaded,
            backlog,
        } = state;

        let pass = self
            .backlog
            .process(&self.classifier, &mut self.api, &mut budget, backlog);
        summary.backlog_downloaded = pass.newly_downloaded.len();
        summary.newly_skipped = pass.newly_skipped;
        summary.not_attempted = pass.not_attempted;
        summary.not_found = pass.not_found;
        summary.transient_errors = pass.transient_errors;
        downloaded.extend(pass.newly_downloaded);
        let mut backlog = pass.backlog;
        let mut fatal = pass.aborted;

        if fatal.is_none() {
            if let Err(e) = self.discover_and_classify(
                &mut budget,
                floor,
                &exclude,
                opts.batch_size,
                &mut downloaded,
                &mut backlog,
                &mut summary,
            ) {
                tracing::error!("discovery pass stopped: {:#}", e);
                fatal = Some(e);
            }
        }

        let state = IngestState {
            downloaded,
            backlog,
        };
        let saved = self.store.save(&state);
        summary.finish(&budget, &state);

        if let Some(e) = fatal {
            if let Err(save_err) = saved {
                tracing::error!("saving state after failed run: {:#}", save_err);
            }
            return Err(e);
        }
        saved?;

        tracing::info!(
            downloaded = summary.downloaded(),
            queued = summary.newly_queued,
            pending = summary.still_pending,
            skipped = summary.newly_skipped.len(),
            not_attempted = summary.not_attempted.len(),
            calls = summary.calls_used,
            remaining = summary.remaining,
            "run finished"
        );
        Ok(summary)
    }

    /// Floor for discovery: the resume floor, then the configured floor, then the
    /// start of the current patch (one billed call). `None` skips discovery.
    fn discovery_floor(
        &mut self,
        resume: Option<i64>,
        budget: &mut BudgetTracker,
        summary: &mut RunSummary,
    ) -> Option<i64> {
        if let Some(floor) = resume.or(self.config.discovery.floor_time) {
            return Some(floor);
        }
        if !budget.consume(1) {
            return None;
        }
        match self.api.latest_patch_start() {
            Ok(Some(start)) => {
                tracing::info!(floor = start, "no watermark yet, starting from current patch");
                Some(start)
            }
            Ok(None) => {
                tracing::warn!("patch list is empty; set discovery.floor_time to discover");
                None
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), "patch lookup failed: {}", e);
                summary.discovery_failed = true;
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn discover_and_classify(
        &mut self,
        budget: &mut BudgetTracker,
        resume: Option<i64>,
        exclude: &HashSet<MatchId>,
        batch_size: u32,
        downloaded: &mut Vec<DownloadedRecord>,
        backlog: &mut Vec<BacklogEntry>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if budget.is_exhausted() {
            tracing::info!("budget spent on backlog, skipping discovery");
            return Ok(());
        }
        if batch_size == 0 {
            return Ok(());
        }
        let Some(floor) = self.discovery_floor(resume, budget, summary) else {
            tracing::warn!("no discovery floor available, skipping discovery");
            return Ok(());
        };

        let in_query = query_exclusions(downloaded.as_slice(), backlog.as_slice(), floor);
        let query = self.discoverer.query(
            floor,
            &in_query,
            self.discoverer.hero_filter(),
            batch_size,
        );
        let candidates = match self.discoverer.discover(&mut self.api, budget, &query, exclude) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "discovery failed, continuing without new matches: {}", e);
                summary.discovery_failed = true;
                return Ok(());
            }
        };
        summary.discovered = candidates.len();

        let source = self.discoverer.source();
        let max_attempts = self.backlog.max_attempts();
        for candidate in candidates {
            let match_id = candidate.match_id;
            let outcome = self.classifier.fetch_and_classify(
                &mut self.api,
                budget,
                match_id,
                source,
                Some(candidate.start_time),
            )?;
            match outcome {
                Outcome::Downloaded { record } => {
                    downloaded.push(record);
                    summary.new_downloaded += 1;
                }
                Outcome::NotAttempted => summary.not_attempted.push(match_id),
                failed => {
                    match failed {
                        Outcome::NotFound => summary.not_found += 1,
                        Outcome::TransientError(_) => summary.transient_errors += 1,
                        _ => {}
                    }
                    let entry = BacklogEntry::queued_after_first_attempt(
                        match_id,
                        source,
                        Utc::now(),
                        max_attempts,
                    );
                    if !entry.is_pending() {
                        summary.newly_skipped.push(match_id);
                    }
                    tracing::debug!(match_id, "queued for parse retry");
                    backlog.push(entry);
                    summary.newly_queued += 1;
                }
            }
        }
        Ok(())
    }

    fn dry_run(&self, state: &IngestState, opts: RunOptions) -> RunSummary {
        let would_retry = self.backlog.select_for_retry(&state.backlog, opts.api_limit);
        let discovery_query = resume_floor(&state.downloaded)
            .or(self.config.discovery.floor_time)
            .filter(|_| opts.batch_size > 0)
            .map(|floor| {
                let in_query = query_exclusions(&state.downloaded, &state.backlog, floor);
                self.discoverer
                    .query(floor, &in_query, self.discoverer.hero_filter(), opts.batch_size)
                    .to_sql()
            });
        tracing::info!(
            would_retry = would_retry.len(),
            batch_size = opts.batch_size,
            "dry run, no remote calls and no writes"
        );

        let mut summary = RunSummary {
            dry_run: Some(DryRunReport {
                would_retry,
                discovery_query,
                batch_size: opts.batch_size,
            }),
            ..RunSummary::default()
        };
        summary.finish(&BudgetTracker::new(opts.api_limit), state);
        summary
    }
}
