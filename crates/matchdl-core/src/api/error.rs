//! Remote call error type.

/// Error from one remote call. All variants are transient for the run: they
/// are logged and counted as a failed attempt, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Connect or transfer timed out.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Network-level failure (connection refused, DNS, reset).
    #[error("connection failed: {0}")]
    Connection(String),
    /// Remote asked us to slow down (429).
    #[error("throttled by remote (HTTP {0})")]
    Throttled(u32),
    /// Any other non-success HTTP status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Explorer rejected or could not finish the query (e.g. statement timeout).
    #[error("query failed: {0}")]
    Query(String),
    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Short label used in logs and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Timeout(_) => "timeout",
            ApiError::Connection(_) => "connection",
            ApiError::Throttled(_) => "throttled",
            ApiError::Http(code) if *code >= 500 => "server",
            ApiError::Http(_) => "http",
            ApiError::Query(_) => "query",
            ApiError::Decode(_) => "decode",
            ApiError::Other(_) => "other",
        }
    }
}
