//! Per-asset failure history, persisted across restarts.
//!
//! Every pipeline failure costs the asset one attempt. Once the attempt
//! count exceeds the configured ceiling the asset is permanently failed and
//! excluded from discovery until an operator resets it. A ceiling of 0
//! means the very first failure is terminal.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::state_file::StateFile;

/// Failure history for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Number of failed processing attempts so far.
    pub attempts: u32,
    /// Description of the most recent error.
    pub last_error: String,
    /// When the most recent attempt failed.
    pub last_failed_at: DateTime<Utc>,
    /// Set once attempts exceed the ceiling; cleared only by reset.
    pub permanent: bool,
}

/// On-disk shape of the failure store.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FailureStoreData {
    #[serde(default)]
    pub failures: HashMap<String, FailureRecord>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Operator-facing aggregate of the failure store.
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub total_failed_assets: usize,
    pub permanently_failed: usize,
    pub retry_candidates: usize,
    pub failure_ceiling: u32,
    /// Up to [`PERMANENT_SAMPLE_SIZE`] permanently-failed asset ids.
    pub permanent_sample: Vec<String>,
}

/// How many permanent ids a summary carries at most.
pub const PERMANENT_SAMPLE_SIZE: usize = 5;

/// Tracks and persists asset processing failures for one account.
///
/// A single engine instance owns the store file; concurrent writers are not
/// supported.
pub struct FailureTracker {
    store: StateFile<FailureStoreData>,
    failures: HashMap<String, FailureRecord>,
    ceiling: u32,
}

impl FailureTracker {
    /// Open the tracker backed by the store at `path`.
    ///
    /// A missing or corrupt store starts empty; that is logged, never fatal.
    pub fn open(path: impl Into<PathBuf>, ceiling: u32) -> Self {
        let store: StateFile<FailureStoreData> = StateFile::new(path);
        let failures = store.load().failures;
        if !failures.is_empty() {
            info!(
                "Loaded {} failure records from {:?}",
                failures.len(),
                store.path()
            );
        }
        Self {
            store,
            failures,
            ceiling,
        }
    }

    /// Record one failed attempt for `asset_id`.
    ///
    /// Returns true while the asset may still be retried, false once it is
    /// permanently failed.
    pub fn record_failure(&mut self, asset_id: &str, error: &str) -> bool {
        let record = self
            .failures
            .entry(asset_id.to_string())
            .or_insert_with(|| FailureRecord {
                attempts: 0,
                last_error: String::new(),
                last_failed_at: Utc::now(),
                permanent: false,
            });

        record.attempts += 1;
        record.last_error = error.to_string();
        record.last_failed_at = Utc::now();

        if record.attempts > self.ceiling {
            record.permanent = true;
            warn!(
                "Asset {} permanently failed after {} attempts: {}",
                asset_id, record.attempts, error
            );
        } else {
            info!(
                "Asset {} failed (attempt {}/{}): {}",
                asset_id,
                record.attempts,
                self.ceiling.saturating_add(1),
                error
            );
        }

        let retryable = !record.permanent;
        self.save();
        retryable
    }

    /// Pure lookup; false for unknown assets.
    pub fn is_permanently_failed(&self, asset_id: &str) -> bool {
        self.failures
            .get(asset_id)
            .map(|r| r.permanent)
            .unwrap_or(false)
    }

    /// All failure records, most recent failure first.
    pub fn failures(&self) -> Vec<(&String, &FailureRecord)> {
        let mut entries: Vec<_> = self.failures.iter().collect();
        entries.sort_by(|a, b| b.1.last_failed_at.cmp(&a.1.last_failed_at));
        entries
    }

    /// Asset ids that are permanently failed.
    pub fn permanently_failed_ids(&self) -> Vec<String> {
        self.failures
            .iter()
            .filter(|(_, r)| r.permanent)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn permanently_failed_count(&self) -> usize {
        self.failures.values().filter(|r| r.permanent).count()
    }

    /// Clear the record for one asset. Returns true if a record existed.
    pub fn reset_one(&mut self, asset_id: &str) -> bool {
        let removed = self.failures.remove(asset_id).is_some();
        if removed {
            info!("Reset failure record for asset {}", asset_id);
            self.save();
        }
        removed
    }

    /// Clear every record. Returns how many were removed.
    pub fn reset_all(&mut self) -> usize {
        let count = self.failures.len();
        if count > 0 {
            self.failures.clear();
            info!("Reset all {} failure records", count);
            self.save();
        }
        count
    }

    pub fn summary(&self) -> FailureSummary {
        let mut permanent_ids = self.permanently_failed_ids();
        permanent_ids.sort();
        let permanently_failed = permanent_ids.len();
        permanent_ids.truncate(PERMANENT_SAMPLE_SIZE);
        FailureSummary {
            total_failed_assets: self.failures.len(),
            permanently_failed,
            retry_candidates: self.failures.len() - permanently_failed,
            failure_ceiling: self.ceiling,
            permanent_sample: permanent_ids,
        }
    }

    fn save(&self) {
        let data = FailureStoreData {
            failures: self.failures.clone(),
            updated_at: Some(Utc::now()),
        };
        // Persistence errors degrade durability, not correctness.
        if let Err(e) = self.store.save(&data) {
            warn!("Failed to save failure store {:?}: {}", self.store.path(), e);
        }
    }
}
