//! libcurl client for the OpenDota HTTP API.
//!
//! Blocking, one request at a time on the calling thread. Every request goes
//! through the token bucket first.

use std::time::Duration;
use url::Url;

use super::explorer::{parse_explorer_response, ExplorerRow};
use super::patch::latest_patch_start;
use super::rate_limit::TokenBucket;
use super::{classify_http_status, ApiError, MatchApi};
use crate::config::ApiConfig;
use crate::model::MatchId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

/// HTTP client for the remote match-statistics API.
#[derive(Debug)]
pub struct OpenDotaClient {
    base_url: String,
    api_key: Option<String>,
    connect_timeout: Duration,
    timeout: Duration,
    limiter: TokenBucket,
}

impl OpenDotaClient {
    pub fn new(cfg: &ApiConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            timeout: Duration::from_secs(cfg.timeout_secs),
            limiter: TokenBucket::new(cfg.rate_limit_per_minute),
        }
    }

    /// Build `{base}/{path}?{params}&api_key=...`.
    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| ApiError::Other(format!("invalid API URL: {}", e)))?;
        if !params.is_empty() || self.api_key.is_some() {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                query.append_pair(k, v);
            }
            if let Some(key) = &self.api_key {
                query.append_pair("api_key", key);
            }
        }
        Ok(url)
    }

    /// Perform one request and return (status, body).
    fn perform(&mut self, method: Method, url: &Url) -> Result<(u32, Vec<u8>), ApiError> {
        self.limiter.acquire();

        let mut body = Vec::new();
        let mut easy = curl::easy::Easy::new();
        easy.url(url.as_str())?;
        easy.follow_location(true)?;
        easy.useragent(concat!("matchdl/", env!("CARGO_PKG_VERSION")))?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;
        if method == Method::Post {
            easy.post(true)?;
            easy.post_fields_copy(&[])?;
        }

        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        tracing::debug!(?method, path = url.path(), status = code, bytes = body.len(), "api call");
        Ok((code, body))
    }
}

fn is_success(code: u32) -> bool {
    (200..300).contains(&code)
}

impl MatchApi for OpenDotaClient {
    fn fetch_match(&mut self, match_id: MatchId) -> Result<Option<Vec<u8>>, ApiError> {
        let url = self.url(&format!("matches/{}", match_id), &[])?;
        let (code, body) = self.perform(Method::Get, &url)?;
        match code {
            404 => Ok(None),
            c if is_success(c) => Ok(Some(body)),
            c => Err(classify_http_status(c)),
        }
    }

    fn request_parse(&mut self, match_id: MatchId) -> Result<(), ApiError> {
        let url = self.url(&format!("request/{}", match_id), &[])?;
        let (code, _) = self.perform(Method::Post, &url)?;
        if is_success(code) {
            Ok(())
        } else {
            Err(classify_http_status(code))
        }
    }

    fn explorer(&mut self, sql: &str) -> Result<Vec<ExplorerRow>, ApiError> {
        let url = self.url("explorer", &[("sql", sql)])?;
        let (code, body) = self.perform(Method::Get, &url)?;
        if is_success(code) {
            return parse_explorer_response(&body);
        }
        // Failed queries usually carry the database message in `err`.
        match parse_explorer_response(&body) {
            Err(e @ ApiError::Query(_)) => Err(e),
            _ => Err(classify_http_status(code)),
        }
    }

    fn latest_patch_start(&mut self) -> Result<Option<i64>, ApiError> {
        let url = self.url("constants/patch", &[])?;
        let (code, body) = self.perform(Method::Get, &url)?;
        if !is_success(code) {
            return Err(classify_http_status(code));
        }
        latest_patch_start(&body)
    }
}
