//! Per-asset tagging pipeline.
//!
//! fetch -> infer -> filter -> resolve -> apply. The processed marker is
//! part of the same bulk apply as the inferred tags, so an asset can never
//! end up marked-but-untagged or tagged-but-unmarked. A failure at any step
//! costs the asset one attempt in the failure tracker and processing moves
//! on to the next asset.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::gallery::{Asset, AssetKind, GalleryApi};
use crate::tagmodel::TagModel;

use super::failure_tracker::FailureTracker;
use super::tag_cache::{is_valid_tag_name, normalize_tag_name, TagCache};

/// Tuning knobs for the pipeline, derived from configuration.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Minimum confidence for a prediction to be applied.
    pub confidence_threshold: f32,
    /// Marker tag applied to every successfully processed asset.
    pub processed_tag: String,
    /// Normalized tag names that are never applied.
    pub tag_blacklist: HashSet<String>,
}

/// Terminal state of one asset within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    /// Tagged and marked processed.
    Done,
    /// Not eligible (non-image); no failure recorded.
    Skipped,
    /// Some pipeline step failed; one attempt recorded.
    Failed,
}

/// Outcome of processing one asset.
#[derive(Debug, Clone)]
pub struct AssetOutcome {
    pub asset_id: String,
    pub status: AssetStatus,
    /// Inferred tag names applied (the processed marker not included).
    pub tags_assigned: Vec<String>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Aggregate result of one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<AssetOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn successful(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == AssetStatus::Done)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == AssetStatus::Failed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == AssetStatus::Skipped)
            .count()
    }

    pub fn tags_assigned(&self) -> u64 {
        self.outcomes.iter().map(|o| o.tags_assigned.len() as u64).sum()
    }
}

/// Drives the tagging pipeline over a batch of assets, one at a time.
pub struct BatchProcessor {
    model: Arc<dyn TagModel>,
    settings: ProcessorSettings,
}

impl BatchProcessor {
    pub fn new(model: Arc<dyn TagModel>, settings: ProcessorSettings) -> Self {
        Self { model, settings }
    }

    /// Process `assets` strictly in order.
    ///
    /// Per-asset failures are recorded in `failures` and never abort the
    /// batch.
    pub async fn process_batch(
        &self,
        api: &Arc<dyn GalleryApi>,
        assets: &[Asset],
        cache: &mut TagCache,
        failures: &mut FailureTracker,
    ) -> BatchReport {
        let batch_start = Instant::now();
        info!("Processing batch of {} assets", assets.len());

        let mut outcomes = Vec::with_capacity(assets.len());
        for asset in assets {
            let outcome = self.process_asset(api, asset, cache).await;
            match outcome.status {
                AssetStatus::Done => {
                    info!(
                        "Asset {} done: {} tags in {:?}",
                        asset.id,
                        outcome.tags_assigned.len(),
                        outcome.elapsed
                    );
                }
                AssetStatus::Skipped => {
                    debug!("Asset {} skipped: not an image", asset.id);
                }
                AssetStatus::Failed => {
                    let error = outcome.error.as_deref().unwrap_or("unknown error");
                    warn!("Asset {} failed: {}", asset.id, error);
                    failures.record_failure(&asset.id, error);
                }
            }
            outcomes.push(outcome);
        }

        let report = BatchReport {
            outcomes,
            elapsed: batch_start.elapsed(),
        };
        info!(
            "Batch complete: {} done, {} failed, {} skipped, {} tags in {:?}",
            report.successful(),
            report.failed(),
            report.skipped(),
            report.tags_assigned(),
            report.elapsed
        );
        report
    }

    async fn process_asset(
        &self,
        api: &Arc<dyn GalleryApi>,
        asset: &Asset,
        cache: &mut TagCache,
    ) -> AssetOutcome {
        let start = Instant::now();

        if asset.kind != AssetKind::Image {
            return AssetOutcome {
                asset_id: asset.id.clone(),
                status: AssetStatus::Skipped,
                tags_assigned: Vec::new(),
                error: None,
                elapsed: start.elapsed(),
            };
        }

        match self.run_pipeline(api, asset, cache).await {
            Ok(tags_assigned) => AssetOutcome {
                asset_id: asset.id.clone(),
                status: AssetStatus::Done,
                tags_assigned,
                error: None,
                elapsed: start.elapsed(),
            },
            Err(error) => AssetOutcome {
                asset_id: asset.id.clone(),
                status: AssetStatus::Failed,
                tags_assigned: Vec::new(),
                error: Some(error),
                elapsed: start.elapsed(),
            },
        }
    }

    /// The fetch -> infer -> filter -> resolve -> apply chain for one asset.
    /// Returns the inferred tag names that were applied.
    async fn run_pipeline(
        &self,
        api: &Arc<dyn GalleryApi>,
        asset: &Asset,
        cache: &mut TagCache,
    ) -> Result<Vec<String>, String> {
        let image = api
            .fetch_thumbnail(&asset.id)
            .await
            .map_err(|e| format!("fetch error: {}", e))?;

        let predictions = self
            .model
            .predict(&image)
            .await
            .map_err(|e| format!("inference error: {}", e))?;

        let names = self.filter_predictions(&predictions);
        debug!(
            "Asset {}: {} of {} predictions pass threshold {}",
            asset.id,
            names.len(),
            predictions.len(),
            self.settings.confidence_threshold
        );

        let marker = normalize_tag_name(&self.settings.processed_tag);
        let mut wanted = names.clone();
        wanted.push(marker.clone());

        let resolved = cache
            .resolve(&wanted)
            .await
            .map_err(|e| format!("tag resolution error: {}", e))?;
        if !resolved.contains_key(&marker) {
            // Without the marker the asset would be rediscovered forever.
            return Err("tag resolution error: processed marker unresolved".to_string());
        }

        let applied_names: Vec<String> = names
            .iter()
            .filter(|n| resolved.contains_key(*n))
            .cloned()
            .collect();
        let tag_ids: Vec<String> = wanted
            .iter()
            .filter_map(|n| resolved.get(n).cloned())
            .collect();

        // One bulk call applies inferred tags and the marker together.
        if let Err(e) = api.tag_assets(std::slice::from_ref(&asset.id), &tag_ids).await {
            if !e.is_transient() {
                // A rejected apply usually means our tag ids went stale
                // (tags deleted or merged remotely since the last refresh).
                cache.invalidate();
            }
            return Err(format!("apply error: {}", e));
        }

        Ok(applied_names)
    }

    /// Threshold, blacklist and normalization, preserving prediction order.
    fn filter_predictions(&self, predictions: &[crate::tagmodel::TagPrediction]) -> Vec<String> {
        let mut names = Vec::new();
        for prediction in predictions {
            if prediction.confidence < self.settings.confidence_threshold {
                continue;
            }
            if !is_valid_tag_name(&prediction.name) {
                continue;
            }
            let normalized = normalize_tag_name(&prediction.name);
            if self.settings.tag_blacklist.contains(&normalized) {
                continue;
            }
            if !names.contains(&normalized) {
                names.push(normalized);
            }
        }
        names
    }
}
