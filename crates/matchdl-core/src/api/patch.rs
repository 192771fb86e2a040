//! Current patch lookup from the `constants/patch` listing.

use chrono::DateTime;
use serde::Deserialize;

use super::ApiError;

#[derive(Debug, Deserialize)]
struct PatchInfo {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

/// Start time (epoch seconds) of the newest patch (highest id) in a
/// `constants/patch` body. `Ok(None)` if the list is empty or the newest patch has no date.
pub fn latest_patch_start(body: &[u8]) -> Result<Option<i64>, ApiError> {
    let patches: Vec<PatchInfo> = serde_json::from_slice(body)
        .map_err(|e| ApiError::Decode(format!("patch list: {}", e)))?;
    let Some(latest) = patches.into_iter().max_by_key(|p| p.id) else {
        return Ok(None);
    };
    let Some(date) = latest.date.as_deref() else {
        return Ok(None);
    };
    let ts = DateTime::parse_from_rfc3339(date)
        .map_err(|e| ApiError::Decode(format!("patch date {:?}: {}", date, e)))?
        .timestamp();
    tracing::debug!(
        patch = latest.name.as_deref().unwrap_or("unknown"),
        id = latest.id,
        start = ts,
        "current patch"
    );
    Ok(Some(ts))
}
