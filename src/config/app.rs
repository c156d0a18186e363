// src/config/app.rs
//! Runtime configuration, resolved once and passed explicitly to the runner.
//!
//! Resolution order:
//! 1) `$OOIR_CONFIG_PATH` (must exist when set)
//! 2) `config/ooir.toml`
//! 3) built-in defaults
//!
//! Then `OOIR_*` environment overrides, then sanitisation. CLI flags are
//! applied by the binaries on top of the result.

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::feeds::{default_feeds, FeedSpec};
use crate::fingerprint::FingerprintMode;
use crate::history::HistoryStore;
use crate::merge::{MergeParams, DEFAULT_MAX_ITEMS, DEFAULT_RETENTION_DAYS};

pub const ENV_CONFIG_PATH: &str = "OOIR_CONFIG_PATH";
pub const ENV_EMAIL: &str = "OOIR_EMAIL";
pub const ENV_OUTPUT_DIR: &str = "OOIR_OUTPUT_DIR";
pub const ENV_MAX_ITEMS: &str = "OOIR_MAX_ITEMS";
pub const ENV_RETENTION_DAYS: &str = "OOIR_RETENTION_DAYS";

pub const DEFAULT_CONFIG_PATH: &str = "config/ooir.toml";
pub const DEFAULT_API_BASE_URL: &str = "https://ooir.org/api.php";
pub const DEFAULT_METADATA_BASE_URL: &str = "https://api.crossref.org/works";
const PLACEHOLDER_EMAIL: &str = "ihre.email@beispiel.de";
/// Upper bound for `retention_days` (100 years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}
fn default_metadata_base_url() -> String {
    DEFAULT_METADATA_BASE_URL.to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("rss_feeds")
}
fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}
fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_pause_between_feeds_ms() -> u64 {
    1_000
}
fn default_public_base_url() -> String {
    "http://localhost/rss_feeds/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Contact address sent to the OOIR API.
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pause_between_feeds_ms")]
    pub pause_between_feeds_ms: u64,
    #[serde(default)]
    pub fingerprint: FingerprintMode,
    /// Fill missing paper fields from Crossref by DOI.
    #[serde(default)]
    pub enrich_metadata: bool,
    #[serde(default = "default_metadata_base_url")]
    pub metadata_base_url: String,
    /// Where the feeds are served from; used in the index page.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default)]
    pub feeds: Vec<FeedSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            api_base_url: default_api_base_url(),
            output_dir: default_output_dir(),
            max_items: default_max_items(),
            retention_days: default_retention_days(),
            request_timeout_secs: default_request_timeout_secs(),
            pause_between_feeds_ms: default_pause_between_feeds_ms(),
            fingerprint: FingerprintMode::default(),
            enrich_metadata: false,
            metadata_base_url: default_metadata_base_url(),
            public_base_url: default_public_base_url(),
            feeds: default_feeds(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path (TOML, or JSON by extension), then env + sanitise.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg: AppConfig = if ext == "json" {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("parsing TOML config {}", path.display()))?
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(ENV_EMAIL) {
            self.email = v.trim().to_string();
        }
        if let Ok(v) = std::env::var(ENV_OUTPUT_DIR) {
            if !v.trim().is_empty() {
                self.output_dir = PathBuf::from(v.trim());
            }
        }
        if let Some(n) = parse_env::<usize>(ENV_MAX_ITEMS) {
            self.max_items = n;
        }
        if let Some(n) = parse_env::<i64>(ENV_RETENTION_DAYS) {
            self.retention_days = n;
        }
    }

    /// Replace out-of-range values with defaults, warning once per fix.
    pub fn sanitize(&mut self) {
        if self.max_items == 0 {
            warn!("max_items must be positive, using {}", DEFAULT_MAX_ITEMS);
            self.max_items = DEFAULT_MAX_ITEMS;
        }
        if self.retention_days <= 0 {
            warn!(
                "retention_days must be positive, using {}",
                DEFAULT_RETENTION_DAYS
            );
            self.retention_days = DEFAULT_RETENTION_DAYS;
        } else if self.retention_days > MAX_RETENTION_DAYS {
            warn!(
                "retention_days {} is too large, using {}",
                self.retention_days, MAX_RETENTION_DAYS
            );
            self.retention_days = MAX_RETENTION_DAYS;
        }
        if self.feeds.is_empty() {
            self.feeds = default_feeds();
        }
        self.email = self.email.trim().to_string();
    }

    /// False when the email is empty or still the sample placeholder.
    pub fn has_contact_email(&self) -> bool {
        !self.email.is_empty() && self.email != PLACEHOLDER_EMAIL
    }

    pub fn merge_params(&self) -> MergeParams {
        let window = Duration::try_days(self.retention_days.clamp(1, MAX_RETENTION_DAYS))
            .unwrap_or_else(|| Duration::days(DEFAULT_RETENTION_DAYS));
        MergeParams::new(self.max_items, window)
            .with_fingerprint_mode(self.fingerprint)
    }

    pub fn history_store(&self) -> HistoryStore {
        HistoryStore::in_output_dir(&self.output_dir)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pause_between_feeds(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pause_between_feeds_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
