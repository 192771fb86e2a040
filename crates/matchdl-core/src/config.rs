use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::MatchSource;

/// Environment variable that overrides `api.api_key`.
pub const API_KEY_ENV: &str = "OPENDOTA_API_KEY";

/// Remote API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Optional key appended as `api_key=` to every request.
    pub api_key: Option<String>,
    /// When true, a run without a key is a configuration error.
    pub require_api_key: bool,
    /// Client-side request cap per rolling minute (0 = unlimited).
    pub rate_limit_per_minute: u32,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opendota.com/api".to_string(),
            api_key: None,
            require_api_key: false,
            rate_limit_per_minute: 60,
            connect_timeout_secs: 15,
            timeout_secs: 30,
        }
    }
}

/// Per-run remote call ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub daily_api_limit: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_api_limit: 1800,
        }
    }
}

/// Filters for the bulk discovery query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub source: MatchSource,
    pub batch_size: u32,
    pub hero_filter_enabled: bool,
    /// Hero allow-list; a match qualifies if any of these played on either team.
    pub hero_ids: Vec<u32>,
    /// Only matches with `avg_rank_tier >= min_rank_tier`.
    pub rank_filter_enabled: bool,
    pub min_rank_tier: u32,
    pub lobby_filter_enabled: bool,
    pub lobby_type: u32,
    pub mode_filter_enabled: bool,
    pub game_mode: u32,
    /// Default discovery floor (epoch seconds) used when nothing is downloaded yet.
    /// When unset, the start of the current patch is fetched from the API.
    pub floor_time: Option<i64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source: MatchSource::PublicMatches,
            batch_size: 50,
            hero_filter_enabled: true,
            hero_ids: vec![20, 26, 27, 28, 30, 31, 85],
            rank_filter_enabled: true,
            min_rank_tier: 70,
            lobby_filter_enabled: true,
            lobby_type: 7,
            mode_filter_enabled: true,
            game_mode: 22,
            floor_time: None,
        }
    }
}

/// Parse backlog retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklogConfig {
    /// Attempts after which a pending entry becomes skipped.
    pub max_attempts: u32,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// Where tracking files and raw payloads live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub tracking_dir: PathBuf,
    pub matches_dir: PathBuf,
    pub public_matches_dir: PathBuf,
}

impl StorageConfig {
    /// Layout rooted at `root`: `tracking/`, `matches/`, `public_matches/`.
    pub fn under(root: &Path) -> Self {
        Self {
            tracking_dir: root.join("tracking"),
            matches_dir: root.join("matches"),
            public_matches_dir: root.join("public_matches"),
        }
    }

    /// Payload directory for a source table.
    pub fn payload_dir(&self, source: MatchSource) -> &Path {
        match source {
            MatchSource::Matches => &self.matches_dir,
            MatchSource::PublicMatches => &self.public_matches_dir,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = xdg::BaseDirectories::with_prefix("matchdl")
            .map(|d| d.get_data_home())
            .unwrap_or_else(|_| PathBuf::from("data"));
        Self::under(&root)
    }
}

/// Global configuration loaded from `~/.config/matchdl/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchdlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub backlog: BacklogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl MatchdlConfig {
    /// Apply the `OPENDOTA_API_KEY` override. Empty values are ignored.
    pub fn with_api_key_override(mut self, env_key: Option<String>) -> Self {
        if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
            self.api.api_key = Some(key.trim().to_string());
        }
        self
    }

    /// Reject settings a run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.api.require_api_key && self.api.api_key.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!(
                "api.require_api_key is set but no API key is configured (set api.api_key or {})",
                API_KEY_ENV
            );
        }
        if self.backlog.max_attempts == 0 {
            anyhow::bail!("backlog.max_attempts must be at least 1");
        }
        if self.discovery.hero_filter_enabled && self.discovery.hero_ids.is_empty() {
            anyhow::bail!("discovery.hero_filter_enabled is set but discovery.hero_ids is empty");
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("matchdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MatchdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MatchdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return finish(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit path. The file must exist.
pub fn load_from_path(path: &Path) -> Result<MatchdlConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: MatchdlConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    finish(cfg)
}

fn finish(cfg: MatchdlConfig) -> Result<MatchdlConfig> {
    let cfg = cfg.with_api_key_override(std::env::var(API_KEY_ENV).ok());
    cfg.validate()?;
    Ok(cfg)
}
