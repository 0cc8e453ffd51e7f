// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{Catalog, DEFAULT_CATEGORIES};
use crate::scheduler::parse_push_at;

pub const ENV_CONFIG_PATH: &str = "PUSH_CONFIG_PATH";
pub const ENV_BUDGET: &str = "PUSH_BUDGET";
pub const ENV_PUSH_AT: &str = "PUSH_AT";
pub const ENV_THROTTLE_MS: &str = "PUSH_THROTTLE_MS";

fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect()
}

/// Runner configuration. Every field has a default, so a partial file only
/// overrides what it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Items per recipient per push.
    pub budget: usize,
    /// Local wall-clock time of the daily push, `HH:MM`.
    pub push_at: String,
    /// Pause between recipients, to stay under the channel's rate limit.
    pub throttle_ms: u64,
    pub categories: Vec<String>,
    pub feed_path: PathBuf,
    pub preferences_path: PathBuf,
    pub ledger_path: PathBuf,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            budget: 10,
            push_at: "07:00".to_string(),
            throttle_ms: 1_000,
            categories: default_categories(),
            feed_path: PathBuf::from("data/feed.json"),
            preferences_path: PathBuf::from("state/preferences.json"),
            ledger_path: PathBuf::from("state/deliveries.jsonl"),
        }
    }
}

impl PushConfig {
    /// Load from an explicit path. TOML or JSON, picked by extension with a
    /// content-sniffing fallback.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading push config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing push config {}", path.display()))?;
        cfg.validated()
    }

    /// Resolution order:
    /// 1) $PUSH_CONFIG_PATH
    /// 2) config/push.toml
    /// 3) config/push.json
    /// 4) built-in defaults
    ///
    /// Env overrides (`PUSH_BUDGET`, `PUSH_AT`, `PUSH_THROTTLE_MS`) are
    /// applied on top in every case.
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new("config/push.toml").exists() {
            Self::load_from(Path::new("config/push.toml"))?
        } else if Path::new("config/push.json").exists() {
            Self::load_from(Path::new("config/push.json"))?
        } else {
            Self::default()
        };
        base.with_env_overrides()?.validated()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var(ENV_BUDGET) {
            self.budget = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_BUDGET}={v:?} is not a number"))?;
        }
        if let Ok(v) = std::env::var(ENV_PUSH_AT) {
            self.push_at = v.trim().to_string();
        }
        if let Ok(v) = std::env::var(ENV_THROTTLE_MS) {
            self.throttle_ms = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_THROTTLE_MS}={v:?} is not a number"))?;
        }
        Ok(self)
    }

    fn validated(mut self) -> Result<Self> {
        if self.budget < 1 {
            bail!("budget must be at least 1");
        }
        parse_push_at(&self.push_at)?;
        self.categories = crate::item::dedup_categories(&self.categories);
        if self.categories.is_empty() {
            self.categories = default_categories();
        }
        Ok(self)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(&self.categories)
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PushConfig> {
    match hint_ext {
        "toml" => return toml::from_str(s).map_err(Into::into),
        "json" => return serde_json::from_str(s).map_err(Into::into),
        _ => {}
    }
    if let Ok(v) = serde_json::from_str(s) {
        return Ok(v);
    }
    toml::from_str(s).map_err(|e| anyhow!("unsupported push config format: {e}"))
}
