mod file_config;

pub use file_config::{AccountConfig, FileConfig, RetryConfig};

use crate::gallery::RequestRetryPolicy;
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.35;
pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_PROCESSED_TAG: &str = "auto:processed";
pub const DEFAULT_TAG_CACHE_TTL_SEC: u64 = 300;
pub const DEFAULT_FAILURE_CEILING: u32 = 3;
pub const DEFAULT_CYCLE_DELAY_SEC: u64 = 5;
pub const DEFAULT_CRON_SCHEDULE: &str = "0 0 2 * * *";
pub const DEFAULT_HEALTH_PORT: u16 = 8000;
pub const MAX_BATCH_SIZE: usize = 500;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_url: Option<String>,
    pub confidence_threshold: Option<f32>,
    pub batch_size: Option<usize>,
    pub state_dir: Option<PathBuf>,
    pub health_port: Option<u16>,
}

/// One gallery account the engine works against.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub accounts: Vec<AccountSettings>,
    pub model_url: String,
    pub confidence_threshold: f32,
    pub batch_size: usize,
    pub processed_tag: String,
    pub tag_blacklist: Vec<String>,
    pub tag_cache_ttl: Duration,
    pub failure_ceiling: u32,
    pub cycle_delay: Duration,
    pub cron_schedule: String,
    pub health_port: u16,
    pub state_dir: PathBuf,
    pub request_timeout_sec: u64,
    pub retry: RequestRetryPolicy,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let mut accounts: Vec<AccountSettings> = file
            .accounts
            .iter()
            .enumerate()
            .map(|(i, account)| AccountSettings {
                name: account
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("account-{}", i + 1)),
                base_url: account.base_url.clone(),
                api_key: account.api_key.clone(),
            })
            .collect();
        if accounts.is_empty() {
            if let (Some(base_url), Some(api_key)) = (&cli.base_url, &cli.api_key) {
                accounts.push(AccountSettings {
                    name: "default".to_string(),
                    base_url: base_url.clone(),
                    api_key: api_key.clone(),
                });
            }
        }
        if accounts.is_empty() {
            bail!(
                "No gallery accounts configured: \
                 pass --base-url and --api-key or add [[accounts]] to the config file"
            );
        }
        let mut seen = HashSet::new();
        for account in &accounts {
            if account.name.trim().is_empty() {
                bail!("Account names must not be empty");
            }
            if !seen.insert(account.name.as_str()) {
                bail!("Duplicate account name: {:?}", account.name);
            }
            validate_base_url(&account.base_url)?;
            if account.api_key.trim().is_empty() {
                bail!("Account {:?} has an empty api_key", account.name);
            }
        }

        let model_url = match file.model_url.or_else(|| cli.model_url.clone()) {
            Some(url) => {
                validate_base_url(&url)?;
                url
            }
            None => bail!("model_url must be specified via --model-url or in config file"),
        };

        let confidence_threshold = file
            .confidence_threshold
            .or(cli.confidence_threshold)
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            bail!(
                "confidence_threshold must be between 0 and 1, got {}",
                confidence_threshold
            );
        }

        let batch_size = file
            .batch_size
            .or(cli.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            bail!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                batch_size
            );
        }

        let processed_tag = file
            .processed_tag
            .unwrap_or_else(|| DEFAULT_PROCESSED_TAG.to_string());
        if processed_tag.trim().is_empty() {
            bail!("processed_tag must not be empty");
        }

        let cron_schedule = file
            .cron_schedule
            .unwrap_or_else(|| DEFAULT_CRON_SCHEDULE.to_string());
        crate::scheduler::CycleSchedule::parse(&cron_schedule)?;

        let retry_file = file.retry.unwrap_or_default();
        let retry_defaults = RequestRetryPolicy::default();
        let retry = RequestRetryPolicy {
            max_attempts: retry_file.max_attempts.unwrap_or(retry_defaults.max_attempts),
            initial_backoff_ms: retry_file
                .initial_backoff_ms
                .unwrap_or(retry_defaults.initial_backoff_ms),
            max_backoff_ms: retry_file
                .max_backoff_ms
                .unwrap_or(retry_defaults.max_backoff_ms),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(retry_defaults.backoff_multiplier),
        };
        if retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }

        Ok(Self {
            accounts,
            model_url,
            confidence_threshold,
            batch_size,
            processed_tag,
            tag_blacklist: file.tag_blacklist.unwrap_or_default(),
            tag_cache_ttl: Duration::from_secs(
                file.tag_cache_ttl_sec.unwrap_or(DEFAULT_TAG_CACHE_TTL_SEC),
            ),
            failure_ceiling: file.failure_ceiling.unwrap_or(DEFAULT_FAILURE_CEILING),
            cycle_delay: Duration::from_secs(
                file.cycle_delay_sec.unwrap_or(DEFAULT_CYCLE_DELAY_SEC),
            ),
            cron_schedule,
            health_port: file
                .health_port
                .or(cli.health_port)
                .unwrap_or(DEFAULT_HEALTH_PORT),
            state_dir: file
                .state_dir
                .map(PathBuf::from)
                .or_else(|| cli.state_dir.clone())
                .unwrap_or_else(|| PathBuf::from("data")),
            request_timeout_sec: file.request_timeout_sec.unwrap_or(30),
            retry,
        })
    }

    pub fn progress_path(&self) -> PathBuf {
        self.state_dir.join("progress.json")
    }

    pub fn failures_path(&self, account_name: &str) -> PathBuf {
        self.state_dir
            .join(format!("failures-{}.json", account_name))
    }
}

fn validate_base_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        bail!("URL must start with http:// or https://, got {:?}", url);
    }
    Ok(())
}
