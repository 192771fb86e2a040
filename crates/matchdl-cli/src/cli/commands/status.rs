//! `matchdl status`: summarize the tracking files. No remote calls.

use anyhow::Result;
use matchdl_core::config::MatchdlConfig;
use matchdl_core::state::{resume_floor, IngestState, StateStore};

pub fn run_status(cfg: &MatchdlConfig) -> Result<()> {
    let store = StateStore::new(&cfg.storage.tracking_dir);
    let state = store.load()?;
    println!("Tracking dir: {}", store.dir().display());
    print!("{}", format_status(&state));
    Ok(())
}

pub(crate) fn format_status(state: &IngestState) -> String {
    let pending = state.backlog.iter().filter(|e| e.is_pending()).count();
    let skipped: Vec<String> = state
        .backlog
        .iter()
        .filter(|e| !e.is_pending())
        .map(|e| e.match_id.to_string())
        .collect();
    let watermark = resume_floor(&state.downloaded)
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut out = format!(
        "{:<12} {}\n{:<12} {}\n{:<12} {}\n{:<12} {}\n",
        "Downloaded:",
        state.downloaded.len(),
        "Pending:",
        pending,
        "Skipped:",
        skipped.len(),
        "Watermark:",
        watermark
    );
    if !skipped.is_empty() {
        out.push_str(&format!("Skipped ids: {}\n", skipped.join(", ")));
    }
    out
}
