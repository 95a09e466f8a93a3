//! Cycle orchestration across one or more gallery accounts.
//!
//! A cycle discovers one batch per account and runs it through the
//! processor. Continuous mode repeats cycles until no account has
//! untagged assets left, a cycle cap is hit, or shutdown is requested.
//! Cumulative progress counters survive restarts via a state file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::gallery::{GalleryApi, GalleryError};

use super::discovery::AssetDiscovery;
use super::failure_tracker::FailureTracker;
use super::processor::BatchProcessor;
use super::state_file::StateFile;
use super::tag_cache::TagCache;

/// Cumulative counters across all cycles and restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressState {
    pub assets_processed: u64,
    pub tags_assigned: u64,
    pub failures_recorded: u64,
    pub processing_time_ms: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Live progress snapshot shared with the health server.
pub type SharedProgress = Arc<RwLock<ProgressState>>;

/// Per-account reachability as observed by the last discovery attempt.
pub type SharedReachability = Arc<RwLock<HashMap<String, bool>>>;

/// Everything the engine needs to work one account.
pub struct AccountRuntime {
    pub name: String,
    pub api: Arc<dyn GalleryApi>,
    pub discovery: AssetDiscovery,
    pub cache: TagCache,
    pub failures: FailureTracker,
}

impl AccountRuntime {
    pub fn new(
        name: impl Into<String>,
        api: Arc<dyn GalleryApi>,
        cache_ttl: Duration,
        failures_path: impl Into<PathBuf>,
        failure_ceiling: u32,
    ) -> Self {
        Self {
            name: name.into(),
            discovery: AssetDiscovery::new(api.clone()),
            cache: TagCache::new(api.clone(), cache_ttl),
            failures: FailureTracker::open(failures_path, failure_ceiling),
            api,
        }
    }
}

/// Result of one cycle across all accounts.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub assets_discovered: usize,
    pub assets_processed: usize,
    pub assets_failed: usize,
    pub assets_skipped: usize,
    pub tags_assigned: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Assets fetched per account per cycle.
    pub batch_size: usize,
    /// Pause between cycles in continuous mode.
    pub cycle_delay: Duration,
}

pub struct CycleEngine {
    accounts: Vec<AccountRuntime>,
    processor: BatchProcessor,
    settings: EngineSettings,
    progress_file: StateFile<ProgressState>,
    progress: SharedProgress,
    reachability: SharedReachability,
}

impl CycleEngine {
    pub fn new(
        accounts: Vec<AccountRuntime>,
        processor: BatchProcessor,
        settings: EngineSettings,
        progress_path: impl Into<PathBuf>,
    ) -> Self {
        let progress_file = StateFile::new(progress_path);
        let progress = Arc::new(RwLock::new(progress_file.load()));
        let reachability = Arc::new(RwLock::new(
            accounts
                .iter()
                .map(|a| (a.name.clone(), true))
                .collect::<HashMap<_, _>>(),
        ));
        Self {
            accounts,
            processor,
            settings,
            progress_file,
            progress,
            reachability,
        }
    }

    /// Handle for the health server; reflects counters after every cycle.
    pub fn progress_handle(&self) -> SharedProgress {
        self.progress.clone()
    }

    /// Handle for the health server; reflects the last discovery attempt
    /// per account.
    pub fn reachability_handle(&self) -> SharedReachability {
        self.reachability.clone()
    }

    /// Run one cycle: one batch per account.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::default();

        for account in &mut self.accounts {
            let assets = match account
                .discovery
                .next_batch(&account.failures, self.settings.batch_size)
                .await
            {
                Ok(assets) => {
                    self.reachability
                        .write()
                        .await
                        .insert(account.name.clone(), true);
                    assets
                }
                Err(e) => {
                    error!("Account {}: discovery failed: {}", account.name, e);
                    self.reachability
                        .write()
                        .await
                        .insert(account.name.clone(), false);
                    continue;
                }
            };
            if assets.is_empty() {
                continue;
            }
            report.assets_discovered += assets.len();

            let batch = self
                .processor
                .process_batch(
                    &account.api,
                    &assets,
                    &mut account.cache,
                    &mut account.failures,
                )
                .await;
            report.assets_processed += batch.successful();
            report.assets_failed += batch.failed();
            report.assets_skipped += batch.skipped();
            report.tags_assigned += batch.tags_assigned();
        }

        report.elapsed = start.elapsed();
        self.record_progress(&report).await;
        info!(
            "Cycle complete: {} discovered, {} processed, {} failed, {} tags in {:?}",
            report.assets_discovered,
            report.assets_processed,
            report.assets_failed,
            report.tags_assigned,
            report.elapsed
        );
        report
    }

    /// Repeat cycles until every account runs dry, `max_cycles` is reached
    /// or `cancel` fires. Returns the number of cycles run.
    pub async fn run_continuous(
        &mut self,
        max_cycles: Option<u32>,
        cancel: &CancellationToken,
    ) -> u32 {
        let mut cycles = 0u32;
        loop {
            if cancel.is_cancelled() {
                info!("Shutdown requested, stopping after {} cycles", cycles);
                break;
            }
            let report = self.run_cycle().await;
            cycles += 1;
            if report.assets_discovered == 0 {
                info!("No untagged assets remain, stopping after {} cycles", cycles);
                break;
            }
            if let Some(max) = max_cycles {
                if cycles >= max {
                    info!("Cycle cap of {} reached", max);
                    break;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, stopping after {} cycles", cycles);
                    break;
                }
                _ = tokio::time::sleep(self.settings.cycle_delay) => {}
            }
        }
        cycles
    }

    /// Ping every account once. Used by the connection check command and
    /// health-only mode.
    pub async fn test_connections(&self) -> Vec<(String, Result<(), GalleryError>)> {
        let mut results = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let result = account.api.ping().await;
            self.reachability
                .write()
                .await
                .insert(account.name.clone(), result.is_ok());
            results.push((account.name.clone(), result));
        }
        results
    }

    pub fn accounts(&self) -> &[AccountRuntime] {
        &self.accounts
    }

    pub async fn progress(&self) -> ProgressState {
        self.progress.read().await.clone()
    }

    /// Zero the cumulative counters, on disk and in the shared snapshot.
    pub async fn reset_progress(&mut self) {
        let fresh = ProgressState {
            updated_at: Some(Utc::now()),
            ..ProgressState::default()
        };
        if let Err(e) = self.progress_file.save(&fresh) {
            error!("Failed to persist progress reset: {}", e);
        }
        *self.progress.write().await = fresh;
    }

    async fn record_progress(&mut self, report: &CycleReport) {
        let mut progress = self.progress.write().await;
        progress.assets_processed += report.assets_processed as u64;
        progress.tags_assigned += report.tags_assigned;
        progress.failures_recorded += report.assets_failed as u64;
        progress.processing_time_ms += report.elapsed.as_millis() as u64;
        progress.updated_at = Some(Utc::now());
        if let Err(e) = self.progress_file.save(&progress) {
            error!("Failed to persist progress: {}", e);
        }
    }
}
