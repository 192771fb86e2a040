//! Bulk discovery of new candidate matches.
//!
//! One explorer query per run: everything newer than the floor that matches
//! the rank/lobby/mode/hero filters and is not already known, newest first,
//! one page of at most `batch_size` rows. Ids returned here land in the
//! exclusion set on the next run, which is what pages through history.

use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write;

use crate::api::{ApiError, ExplorerRow, MatchApi};
use crate::budget::BudgetTracker;
use crate::config::DiscoveryConfig;
use crate::model::{MatchId, MatchSource};

/// A newly discovered match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub match_id: MatchId,
    pub start_time: i64,
}

/// Filters for one discovery query.
#[derive(Debug, Clone)]
pub struct DiscoveryQuery<'a> {
    pub source: MatchSource,
    /// Only matches that started strictly after this (epoch seconds).
    pub floor_time: i64,
    pub exclude_ids: &'a HashSet<MatchId>,
    /// Any of these heroes on either team. `None` disables hero filtering.
    pub hero_filter: Option<&'a [u32]>,
    pub min_rank_tier: Option<u32>,
    pub lobby_type: Option<u32>,
    pub game_mode: Option<u32>,
    pub batch_size: u32,
}

impl DiscoveryQuery<'_> {
    /// Render the explorer SQL. Excluded ids are sorted so the text is deterministic.
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT match_id, start_time\nFROM {}\nWHERE start_time > {}",
            self.source, self.floor_time
        );
        if let Some(tier) = self.min_rank_tier {
            let _ = write!(sql, "\nAND avg_rank_tier >= {}", tier);
        }
        if let Some(lobby) = self.lobby_type {
            let _ = write!(sql, "\nAND lobby_type = {}", lobby);
        }
        if let Some(mode) = self.game_mode {
            let _ = write!(sql, "\nAND game_mode = {}", mode);
        }
        if let Some(heroes) = self.hero_filter.filter(|h| !h.is_empty()) {
            let list = heroes
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            // Array overlap on the concatenated rosters: any listed hero on either side.
            let _ = write!(sql, "\nAND ((radiant_team || dire_team) && ARRAY[{}])", list);
        }
        if !self.exclude_ids.is_empty() {
            let mut ids: Vec<MatchId> = self.exclude_ids.iter().copied().collect();
            ids.sort_unstable();
            let list = ids
                .iter()
                .map(MatchId::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let _ = write!(sql, "\nAND match_id NOT IN ({})", list);
        }
        let _ = write!(
            sql,
            "\nORDER BY start_time DESC\nLIMIT {}",
            self.batch_size
        );
        sql
    }
}

/// Builds and runs discovery queries with the configured filters.
#[derive(Debug, Clone)]
pub struct Discoverer {
    cfg: DiscoveryConfig,
}

impl Discoverer {
    pub fn new(cfg: DiscoveryConfig) -> Self {
        Self { cfg }
    }

    /// Hero allow-list when hero filtering is enabled.
    pub fn hero_filter(&self) -> Option<&[u32]> {
        self.cfg
            .hero_filter_enabled
            .then_some(self.cfg.hero_ids.as_slice())
    }

    pub fn source(&self) -> MatchSource {
        self.cfg.source
    }

    pub fn query<'a>(
        &'a self,
        floor_time: i64,
        exclude_ids: &'a HashSet<MatchId>,
        hero_filter: Option<&'a [u32]>,
        batch_size: u32,
    ) -> DiscoveryQuery<'a> {
        DiscoveryQuery {
            source: self.cfg.source,
            floor_time,
            exclude_ids,
            hero_filter,
            min_rank_tier: self
                .cfg
                .rank_filter_enabled
                .then_some(self.cfg.min_rank_tier),
            lobby_type: self
                .cfg
                .lobby_filter_enabled
                .then_some(self.cfg.lobby_type),
            game_mode: self
                .cfg
                .mode_filter_enabled
                .then_some(self.cfg.game_mode),
            batch_size,
        }
    }

    /// Run one discovery query (one billed call). Returns candidates newest first,
    /// at most `query.batch_size`, none of them in `known`. No budget or a zero
    /// batch size returns nothing without calling the remote.
    ///
    /// `query.exclude_ids` only needs the ids the floor does not already rule out;
    /// `known` is every tracked id and is applied again to the rows that come back.
    pub fn discover<A: MatchApi>(
        &self,
        api: &mut A,
        budget: &mut BudgetTracker,
        query: &DiscoveryQuery<'_>,
        known: &HashSet<MatchId>,
    ) -> Result<Vec<Candidate>, ApiError> {
        if query.batch_size == 0 {
            return Ok(Vec::new());
        }
        if !budget.consume(1) {
            tracing::warn!("no budget left for discovery");
            return Ok(Vec::new());
        }

        let sql = query.to_sql();
        tracing::debug!(
            excluded = query.exclude_ids.len(),
            known = known.len(),
            "discovery query:\n{}",
            sql
        );
        let rows = api.explorer(&sql)?;
        let candidates = select_candidates(&rows, known, query.batch_size as usize);
        tracing::info!(
            rows = rows.len(),
            candidates = candidates.len(),
            source = %query.source,
            "discovered new matches"
        );
        Ok(candidates)
    }
}

fn as_i64(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn explorer rows into candidates: drop malformed rows, duplicates and
/// known ids (the remote is not trusted to honour `NOT IN`), newest first, capped.
fn select_candidates(
    rows: &[ExplorerRow],
    exclude_ids: &HashSet<MatchId>,
    limit: usize,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut out: Vec<Candidate> = rows
        .iter()
        .filter_map(|row| {
            let match_id = as_i64(row.get("match_id"));
            let start_time = as_i64(row.get("start_time"));
            match (match_id, start_time) {
                (Some(match_id), Some(start_time)) => Some(Candidate {
                    match_id,
                    start_time,
                }),
                _ => {
                    tracing::warn!("skipping explorer row without match_id/start_time: {:?}", row);
                    None
                }
            }
        })
        .filter(|c| !exclude_ids.contains(&c.match_id))
        .filter(|c| seen.insert(c.match_id))
        .collect();
    out.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.match_id.cmp(&a.match_id)));
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeApi};

    fn discoverer() -> Discoverer {
        Discoverer::new(DiscoveryConfig::default())
    }

    #[test]
    fn sql_has_all_conjunctive_clauses() {
        let d = discoverer();
        let exclude: HashSet<MatchId> = [30, 10, 20].into_iter().collect();
        let sql = d
            .query(1_747_956_961, &exclude, d.hero_filter(), 50)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT match_id, start_time\n\
             FROM public_matches\n\
             WHERE start_time > 1747956961\n\
             AND avg_rank_tier >= 70\n\
             AND lobby_type = 7\n\
             AND game_mode = 22\n\
             AND ((radiant_team || dire_team) && ARRAY[20,26,27,28,30,31,85])\n\
             AND match_id NOT IN (10,20,30)\n\
             ORDER BY start_time DESC\n\
             LIMIT 50"
        );
    }

    #[test]
    fn optional_clauses_are_omitted() {
        let cfg: DiscoveryConfig = toml::from_str(
            r#"
            source = "matches"
            hero_filter_enabled = false
            rank_filter_enabled = false
            lobby_filter_enabled = false
            mode_filter_enabled = false
            "#,
        )
        .unwrap();
        let d = Discoverer::new(cfg);
        assert!(d.hero_filter().is_none());
        let sql = d.query(5, &HashSet::new(), d.hero_filter(), 3).to_sql();
        assert_eq!(
            sql,
            "SELECT match_id, start_time\nFROM matches\nWHERE start_time > 5\nORDER BY start_time DESC\nLIMIT 3"
        );
    }

    #[test]
    fn each_filter_switches_off_on_its_own() {
        let cfg: DiscoveryConfig = toml::from_str("lobby_filter_enabled = false\n").unwrap();
        let d = Discoverer::new(cfg);
        let sql = d.query(5, &HashSet::new(), d.hero_filter(), 3).to_sql();
        assert!(sql.contains("avg_rank_tier >= 70"));
        assert!(!sql.contains("lobby_type"));
        assert!(sql.contains("game_mode = 22"));
    }

    #[test]
    fn results_are_filtered_sorted_and_capped() {
        let d = discoverer();
        let mut api = FakeApi::new().with_explorer_rows(&[
            (1, 100),
            (2, 300),
            (3, 200),
            (2, 300),
            (4, 400),
        ]);
        let known: HashSet<MatchId> = [4].into_iter().collect();
        let mut budget = BudgetTracker::new(5);
        let none = HashSet::new();
        let got = d
            .discover(&mut api, &mut budget, &d.query(0, &none, None, 2), &known)
            .unwrap();
        assert_eq!(
            got,
            vec![
                Candidate { match_id: 2, start_time: 300 },
                Candidate { match_id: 3, start_time: 200 },
            ]
        );
        assert_eq!(budget.used(), 1);
    }

    #[test]
    fn query_failure_is_returned() {
        let d = discoverer();
        let mut api = FakeApi::new();
        api.explorer_error = Some("canceling statement due to statement timeout".into());
        let mut budget = BudgetTracker::new(5);
        let none = HashSet::new();
        let err = d
            .discover(&mut api, &mut budget, &d.query(0, &none, None, 10), &none)
            .unwrap_err();
        assert!(matches!(err, ApiError::Query(_)));
        assert_eq!(budget.used(), 1);
    }

    #[test]
    fn no_call_without_budget_or_batch() {
        let d = discoverer();
        let mut api = FakeApi::new().with_explorer_rows(&[(1, 100)]);
        let none = HashSet::new();
        let mut empty = BudgetTracker::new(0);
        assert!(d
            .discover(&mut api, &mut empty, &d.query(0, &none, None, 10), &none)
            .unwrap()
            .is_empty());
        let mut budget = BudgetTracker::new(5);
        assert!(d
            .discover(&mut api, &mut budget, &d.query(0, &none, None, 0), &none)
            .unwrap()
            .is_empty());
        assert_eq!(api.call_count(), 0);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn string_ids_and_malformed_rows() {
        let mut good = ExplorerRow::new();
        good.insert("match_id".into(), Value::String("77".into()));
        good.insert("start_time".into(), 10.into());
        let mut bad = ExplorerRow::new();
        bad.insert("match_id".into(), Value::Null);
        let got = select_candidates(&[good, bad], &HashSet::new(), 10);
        assert_eq!(got, vec![Candidate { match_id: 77, start_time: 10 }]);
    }

    #[test]
    fn discover_sends_rendered_sql() {
        let d = discoverer();
        let mut api = FakeApi::new();
        let mut budget = BudgetTracker::new(5);
        let none = HashSet::new();
        d.discover(&mut api, &mut budget, &d.query(42, &none, d.hero_filter(), 7), &none)
            .unwrap();
        match &api.calls[..] {
            [Call::Explorer(sql)] => {
                assert!(sql.contains("WHERE start_time > 42"));
                assert!(sql.ends_with("LIMIT 7"));
            }
            other => panic!("unexpected calls {:?}", other),
        }
    }

    #[test]
    fn known_ids_filter_rows_even_when_not_in_query() {
        let d = discoverer();
        // The query only excludes 2; 1 is known from an older download.
        let mut api = FakeApi::new().with_explorer_rows(&[(1, 100), (2, 90), (3, 80)]);
        let in_query: HashSet<MatchId> = [2].into_iter().collect();
        let known: HashSet<MatchId> = [1, 2].into_iter().collect();
        let mut budget = BudgetTracker::new(5);
        let query = d.query(0, &in_query, None, 10);
        let got = d.discover(&mut api, &mut budget, &query, &known).unwrap();
        assert_eq!(got, vec![Candidate { match_id: 3, start_time: 80 }]);
        assert!(query.to_sql().contains("NOT IN (2)"));
    }
}
