//! Remote match-statistics API.
//!
//! The pipeline only depends on the `MatchApi` trait; `OpenDotaClient` is the
//! libcurl implementation and `testing::FakeApi` the scripted one. Every
//! failure is an `ApiError`, which callers treat as transient.

mod classify;
mod error;
mod explorer;
mod opendota;
mod patch;
mod rate_limit;

pub use classify::{classify_curl_error, classify_http_status};
pub use error::ApiError;
pub use explorer::{parse_explorer_response, ExplorerRow};
pub use opendota::OpenDotaClient;
pub use patch::latest_patch_start;
pub use rate_limit::TokenBucket;

use crate::model::MatchId;

/// Operations the ingestion core needs from the remote side. Each method is
/// exactly one billable remote call.
pub trait MatchApi {
    /// Fetch one match record. `Ok(None)` means the remote does not have it (yet).
    fn fetch_match(&mut self, match_id: MatchId) -> Result<Option<Vec<u8>>, ApiError>;

    /// Ask the remote to deep-process a match. Fire and forget.
    fn request_parse(&mut self, match_id: MatchId) -> Result<(), ApiError>;

    /// Run a bulk explorer query and return its rows.
    fn explorer(&mut self, sql: &str) -> Result<Vec<ExplorerRow>, ApiError>;

    /// Start time (epoch seconds) of the current game patch, if the remote knows it.
    fn latest_patch_start(&mut self) -> Result<Option<i64>, ApiError>;
}

impl<T: MatchApi + ?Sized> MatchApi for &mut T {
    fn fetch_match(&mut self, match_id: MatchId) -> Result<Option<Vec<u8>>, ApiError> {
        (**self).fetch_match(match_id)
    }

    fn request_parse(&mut self, match_id: MatchId) -> Result<(), ApiError> {
        (**self).request_parse(match_id)
    }

    fn explorer(&mut self, sql: &str) -> Result<Vec<ExplorerRow>, ApiError> {
        (**self).explorer(sql)
    }

    fn latest_patch_start(&mut self) -> Result<Option<i64>, ApiError> {
        (**self).latest_patch_start()
    }
}
