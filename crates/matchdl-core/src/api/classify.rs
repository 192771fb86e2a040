//! Classify HTTP status and curl errors into `ApiError`.

use super::ApiError;

/// Map a non-success HTTP status to an error. 404 is handled by callers as "not found".
pub fn classify_http_status(code: u32) -> ApiError {
    match code {
        429 => ApiError::Throttled(code),
        _ => ApiError::Http(code),
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> ApiError {
    if e.is_operation_timedout() {
        return ApiError::Timeout(e.to_string());
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ApiError::Connection(e.to_string());
    }
    ApiError::Other(e.to_string())
}

impl From<curl::Error> for ApiError {
    fn from(e: curl::Error) -> Self {
        classify_curl_error(&e)
    }
}
