use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub model_url: Option<String>,
    pub confidence_threshold: Option<f32>,
    pub batch_size: Option<usize>,
    pub processed_tag: Option<String>,
    pub tag_blacklist: Option<Vec<String>>,
    pub tag_cache_ttl_sec: Option<u64>,
    pub failure_ceiling: Option<u32>,
    pub cycle_delay_sec: Option<u64>,
    pub cron_schedule: Option<String>,
    pub health_port: Option<u16>,
    pub state_dir: Option<String>,
    pub request_timeout_sec: Option<u64>,

    // Feature configs
    pub retry: Option<RetryConfig>,
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

/// One `[[accounts]]` table in the TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub name: Option<String>,
    pub base_url: String,
    pub api_key: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
