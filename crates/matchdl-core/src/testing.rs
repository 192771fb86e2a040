//! Scripted in-memory `MatchApi` for tests of the pipeline and its parts.
//!
//! Responses are keyed by match id and consumed in order; once a script runs
//! dry the last response repeats. Every call is recorded so tests can count
//! exactly what a run billed.

use std::collections::{HashMap, VecDeque};

use crate::api::{ApiError, ExplorerRow, MatchApi};
use crate::model::MatchId;

/// Canned answer for one match fetch.
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// Deep-processed payload.
    Parsed,
    /// Found but not deep-processed yet.
    Unparsed,
    /// Remote does not have the match (404).
    NotFound,
    /// Transient failure (e.g. 502).
    Fail,
    /// Exact body to return.
    Body(Vec<u8>),
}

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(MatchId),
    RequestParse(MatchId),
    Explorer(String),
    Patch,
}

#[derive(Debug, Default)]
pub struct FakeApi {
    fetches: HashMap<MatchId, VecDeque<FetchScript>>,
    /// `(match_id, start_time)` rows returned by every explorer query.
    pub explorer_rows: Vec<(MatchId, i64)>,
    /// When set, explorer queries fail with this error message.
    pub explorer_error: Option<String>,
    pub patch_start: Option<i64>,
    /// When true, parse requests fail (they are best effort).
    pub fail_parse_requests: bool,
    pub calls: Vec<Call>,
}

/// Payload shaped like a remote match record.
pub fn match_body(match_id: MatchId, start_time: i64, patch: u32, parsed: bool) -> Vec<u8> {
    format!(
        r#"{{"match_id":{},"start_time":{},"duration":2400,"patch":{},"od_data":{{"has_parsed":{}}},"players":[]}}"#,
        match_id, start_time, patch, parsed
    )
    .into_bytes()
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answers for successive fetches of `match_id`.
    pub fn script(&mut self, match_id: MatchId, answers: impl IntoIterator<Item = FetchScript>) {
        self.fetches
            .entry(match_id)
            .or_default()
            .extend(answers);
    }

    pub fn with_explorer_rows(mut self, rows: &[(MatchId, i64)]) -> Self {
        self.explorer_rows = rows.to_vec();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn fetches_of(&self, match_id: MatchId) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == Call::Fetch(match_id))
            .count()
    }

    pub fn parse_requests(&self) -> Vec<MatchId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::RequestParse(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn next_answer(&mut self, match_id: MatchId) -> FetchScript {
        match self.fetches.get_mut(&match_id) {
            Some(q) if q.len() > 1 => q.pop_front().unwrap_or(FetchScript::NotFound),
            Some(q) => q.front().cloned().unwrap_or(FetchScript::NotFound),
            None => FetchScript::NotFound,
        }
    }
}

impl MatchApi for FakeApi {
    fn fetch_match(&mut self, match_id: MatchId) -> Result<Option<Vec<u8>>, ApiError> {
        self.calls.push(Call::Fetch(match_id));
        match self.next_answer(match_id) {
            FetchScript::Parsed => Ok(Some(match_body(match_id, 1_750_000_000, 58, true))),
            FetchScript::Unparsed => Ok(Some(match_body(match_id, 1_750_000_000, 58, false))),
            FetchScript::NotFound => Ok(None),
            FetchScript::Fail => Err(ApiError::Http(502)),
            FetchScript::Body(b) => Ok(Some(b)),
        }
    }

    fn request_parse(&mut self, match_id: MatchId) -> Result<(), ApiError> {
        self.calls.push(Call::RequestParse(match_id));
        if self.fail_parse_requests {
            return Err(ApiError::Http(500));
        }
        Ok(())
    }

    fn explorer(&mut self, sql: &str) -> Result<Vec<ExplorerRow>, ApiError> {
        self.calls.push(Call::Explorer(sql.to_string()));
        if let Some(msg) = &self.explorer_error {
            return Err(ApiError::Query(msg.clone()));
        }
        Ok(self
            .explorer_rows
            .iter()
            .map(|(id, start)| {
                let mut row = ExplorerRow::new();
                row.insert("match_id".to_string(), (*id).into());
                row.insert("start_time".to_string(), (*start).into());
                row
            })
            .collect())
    }

    fn latest_patch_start(&mut self) -> Result<Option<i64>, ApiError> {
        self.calls.push(Call::Patch);
        Ok(self.patch_start)
    }
}
