//! `matchdl fetch-daily`: one budget-gated ingestion run.

use anyhow::Result;
use matchdl_core::api::{MatchApi, OpenDotaClient};
use matchdl_core::config::MatchdlConfig;
use matchdl_core::lock;
use matchdl_core::pipeline::{Pipeline, RunOptions, RunSummary};
use std::fmt::Write;

pub fn run_fetch_daily(
    cfg: &MatchdlConfig,
    api_limit: Option<u32>,
    batch_size: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let opts = RunOptions {
        api_limit: api_limit.unwrap_or(cfg.budget.daily_api_limit),
        batch_size: batch_size.unwrap_or(cfg.discovery.batch_size),
        dry_run,
    };
    let summary = execute(cfg, opts, OpenDotaClient::new(&cfg.api))?;
    print!("{}", format_summary(&summary));
    Ok(())
}

/// Run the pipeline. Real runs hold the tracking-dir lock; dry runs write nothing and skip it.
pub(crate) fn execute<A: MatchApi>(cfg: &MatchdlConfig, opts: RunOptions, api: A) -> Result<RunSummary> {
    let mut pipeline = Pipeline::new(cfg.clone(), api)?;
    if opts.dry_run {
        return pipeline.run(opts);
    }
    let lock_path = lock::lock_path(&cfg.storage.tracking_dir);
    lock::with_run_lock(&lock_path, || pipeline.run(opts))
}

fn ids(list: &[i64]) -> String {
    list.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn format_summary(s: &RunSummary) -> String {
    let mut out = String::new();
    if let Some(report) = &s.dry_run {
        let _ = writeln!(out, "Dry run: no remote calls made, no files written.");
        let _ = writeln!(
            out,
            "Would retry {} backlog entries (api limit {}).",
            report.would_retry.len(),
            s.ceiling
        );
        if !report.would_retry.is_empty() {
            let _ = writeln!(out, "  {}", ids(&report.would_retry));
        }
        match &report.discovery_query {
            Some(sql) => {
                let _ = writeln!(out, "Would discover up to {} matches with:", report.batch_size);
                for line in sql.lines() {
                    let _ = writeln!(out, "  {}", line);
                }
            }
            None if report.batch_size == 0 => {
                let _ = writeln!(out, "Discovery disabled (batch size 0).");
            }
            None => {
                let _ = writeln!(out, "Discovery floor needs a patch lookup; query not shown.");
            }
        }
        let _ = writeln!(
            out,
            "Tracked: {} downloaded, {} pending, {} in backlog.",
            s.total_downloaded, s.still_pending, s.total_backlog
        );
        return out;
    }

    let _ = writeln!(
        out,
        "{:<15} {} ({} from backlog, {} new)",
        "Downloaded:",
        s.downloaded(),
        s.backlog_downloaded,
        s.new_downloaded
    );
    let _ = writeln!(out, "{:<15} {}", "Queued:", s.newly_queued);
    let _ = writeln!(out, "{:<15} {}", "Still pending:", s.still_pending);
    let _ = writeln!(out, "{:<15} {}", "Skipped:", s.newly_skipped.len());
    if !s.newly_skipped.is_empty() {
        let _ = writeln!(out, "  {}", ids(&s.newly_skipped));
    }
    let _ = writeln!(out, "{:<15} {}", "Not attempted:", s.not_attempted.len());
    let _ = writeln!(out, "{:<15} {}", "Not found:", s.not_found);
    let _ = writeln!(out, "{:<15} {}", "Errors:", s.transient_errors);
    if s.discovery_failed {
        let _ = writeln!(out, "{:<15} failed (see log)", "Discovery:");
    } else {
        let _ = writeln!(out, "{:<15} {} candidates", "Discovery:", s.discovered);
    }
    let _ = writeln!(
        out,
        "{:<15} {}/{} ({} left)",
        "API calls:", s.calls_used, s.ceiling, s.remaining
    );
    let _ = writeln!(
        out,
        "{:<15} {} downloaded, {} in backlog",
        "Totals:", s.total_downloaded, s.total_backlog
    );
    out
}
