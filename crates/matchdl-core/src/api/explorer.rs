//! Decode explorer query responses.
//!
//! The explorer returns `{"rows": [...], "fields": [{"name": ...}], "err": ...}`.
//! Rows come either as objects keyed by column name or as arrays aligned with
//! `fields`; both are normalized to `ExplorerRow`.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::ApiError;

/// One result row keyed by column name.
pub type ExplorerRow = Map<String, Value>;

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    #[serde(default)]
    rows: Vec<Value>,
    #[serde(default)]
    fields: Vec<ExplorerField>,
    #[serde(default)]
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExplorerField {
    name: String,
}

/// Parse an explorer response body into rows.
pub fn parse_explorer_response(body: &[u8]) -> Result<Vec<ExplorerRow>, ApiError> {
    let resp: ExplorerResponse =
        serde_json::from_slice(body).map_err(|e| ApiError::Decode(format!("explorer: {}", e)))?;

    match resp.err {
        None | Some(Value::Null) => {}
        Some(Value::String(msg)) => return Err(ApiError::Query(msg)),
        Some(other) => return Err(ApiError::Query(other.to_string())),
    }

    let names: Vec<&str> = resp.fields.iter().map(|f| f.name.as_str()).collect();
    let mut rows = Vec::with_capacity(resp.rows.len());
    for row in resp.rows {
        match row {
            Value::Object(map) => rows.push(map),
            Value::Array(values) if values.len() == names.len() => {
                let map = names
                    .iter()
                    .map(|n| n.to_string())
                    .zip(values)
                    .collect::<Map<String, Value>>();
                rows.push(map);
            }
            other => tracing::warn!("unexpected explorer row format: {}", other),
        }
    }
    Ok(rows)
}
