//! Tests for the tracking files and the derived dedup/watermark views.

use super::*;
use crate::model::{BacklogStatus, MatchSource};
use crate::storage::temp_path;
use chrono::{DateTime, TimeZone, Utc};
use std::fs;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn record(id: MatchId, start: i64, patch: u32) -> DownloadedRecord {
    DownloadedRecord {
        match_id: id,
        start_time: start,
        source: MatchSource::PublicMatches,
        downloaded_time: t(1_750_000_000),
        file_size: 1024,
        patch,
    }
}

fn entry(id: MatchId, attempts: u32, status: BacklogStatus, queued: i64) -> BacklogEntry {
    BacklogEntry {
        match_id: id,
        source: MatchSource::PublicMatches,
        attempts,
        last_attempt_time: Some(t(queued + 10)),
        status,
        first_queued_time: t(queued),
    }
}

#[test]
fn missing_files_load_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("tracking"));
    assert_eq!(store.load().unwrap(), IngestState::default());
}

#[test]
fn save_then_load_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    let state = IngestState {
        downloaded: vec![record(1, 100, 58), record(2, 200, 58)],
        backlog: vec![
            entry(3, 1, BacklogStatus::Pending, 1000),
            BacklogEntry {
                last_attempt_time: None,
                ..entry(4, 2, BacklogStatus::Skipped, 900)
            },
        ],
    };
    store.save(&state).unwrap();
    assert_eq!(store.load().unwrap(), state);
    assert!(!temp_path(&store.downloaded_path()).exists());
    assert!(!temp_path(&store.backlog_path()).exists());
}

#[test]
fn empty_sets_still_write_headers() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    store.save(&IngestState::default()).unwrap();
    assert_eq!(
        fs::read_to_string(store.downloaded_path()).unwrap(),
        "match_id,start_time,source,downloaded_time,file_size,patch\n"
    );
    assert_eq!(
        fs::read_to_string(store.backlog_path()).unwrap(),
        "match_id,source,attempts,last_attempt_time,status,first_queued_time\n"
    );
}

#[test]
fn reads_files_written_with_offset_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    fs::write(
        store.downloaded_path(),
        "match_id,start_time,source,downloaded_time,file_size,patch\n\
         8123456789,1748000000,public_matches,2025-06-01T12:00:00.123456+00:00,52311,58\n",
    )
    .unwrap();
    fs::write(
        store.backlog_path(),
        "match_id,source,attempts,last_attempt_time,status,first_queued_time\n\
         8123456790,public_matches,1,2025-06-01T12:00:01+00:00,pending,2025-06-01T12:00:01+00:00\n",
    )
    .unwrap();
    let state = store.load().unwrap();
    assert_eq!(state.downloaded[0].match_id, 8_123_456_789);
    assert_eq!(state.downloaded[0].patch, 58);
    assert_eq!(state.backlog[0].status, BacklogStatus::Pending);
    assert_eq!(state.backlog[0].attempts, 1);
}

#[test]
fn malformed_file_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    fs::write(
        store.downloaded_path(),
        "match_id,start_time,source,downloaded_time,file_size,patch\n\
         not-a-number,1,public_matches,2025-06-01T12:00:00Z,1,58\n",
    )
    .unwrap();
    let err = store.load().unwrap_err();
    assert!(format!("{:#}", err).contains("parse tracking file"));
}

#[test]
fn unknown_source_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    fs::write(
        store.backlog_path(),
        "match_id,source,attempts,last_attempt_time,status,first_queued_time\n\
         1,league_matches,0,,pending,2025-06-01T12:00:00Z\n",
    )
    .unwrap();
    assert!(store.load().is_err());
}

#[test]
fn missing_column_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    fs::write(store.backlog_path(), "match_id,source\n1,matches\n").unwrap();
    let err = store.load().unwrap_err();
    assert!(err.to_string().contains("missing column"));
}

#[test]
fn duplicate_ids_are_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    let state = IngestState {
        downloaded: vec![record(1, 100, 58), record(1, 100, 58)],
        backlog: vec![],
    };
    store.save(&state).unwrap();
    let err = store.load().unwrap_err();
    assert!(err.to_string().contains("twice"));
}

#[test]
fn overlap_is_repaired_in_favour_of_download() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    let state = IngestState {
        downloaded: vec![record(1, 100, 58)],
        backlog: vec![
            entry(1, 1, BacklogStatus::Pending, 50),
            entry(2, 1, BacklogStatus::Pending, 60),
        ],
    };
    store.save(&state).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded.downloaded.len(), 1);
    assert_eq!(loaded.backlog.len(), 1);
    assert_eq!(loaded.backlog[0].match_id, 2);
}

#[test]
fn exclusion_set_unions_both_sets() {
    let downloaded = vec![record(1, 100, 58), record(2, 200, 58)];
    let backlog = vec![
        entry(3, 1, BacklogStatus::Pending, 10),
        entry(4, 2, BacklogStatus::Skipped, 20),
    ];
    let set = exclusion_set(&downloaded, &backlog);
    assert_eq!(set, [1, 2, 3, 4].into_iter().collect());
}

#[test]
fn query_exclusions_skip_downloads_at_or_below_floor() {
    let downloaded = vec![record(1, 100, 57), record(2, 200, 58), record(3, 300, 58)];
    let backlog = vec![entry(4, 1, BacklogStatus::Pending, 10)];
    let set = query_exclusions(&downloaded, &backlog, 200);
    assert_eq!(set, [3, 4].into_iter().collect());
}

#[test]
fn resume_floor_uses_latest_patch_only() {
    assert_eq!(resume_floor(&[]), None);
    let downloaded = vec![
        record(1, 50, 57),
        record(2, 300, 58),
        record(3, 200, 58),
        record(4, 400, 58),
    ];
    assert_eq!(resume_floor(&downloaded), Some(200));
}
