//! Discovery of assets that still need tagging.

use std::sync::Arc;

use tracing::{debug, info};

use crate::gallery::{Asset, AssetKind, GalleryApi, GalleryError};

use super::failure_tracker::FailureTracker;

/// The remote search naturally pages; never ask for more than this.
const SEARCH_PAGE_CAP: usize = 250;

/// Finds the next batch of work for one account.
///
/// The remote side only returns image assets carrying no tags at all, so an
/// asset that received the processed marker (or any tag from another
/// process) stops being discovered. Permanently-failed assets cannot be
/// filtered remotely and are dropped locally.
pub struct AssetDiscovery {
    api: Arc<dyn GalleryApi>,
}

impl AssetDiscovery {
    pub fn new(api: Arc<dyn GalleryApi>) -> Self {
        Self { api }
    }

    /// Return up to `limit` eligible assets; an empty batch means discovery
    /// is exhausted.
    pub async fn next_batch(
        &self,
        failures: &FailureTracker,
        limit: usize,
    ) -> Result<Vec<Asset>, GalleryError> {
        // Permanently-failed assets sit at the head of the untagged search
        // forever; over-fetch by their count so they cannot starve a batch.
        let fetch_size = limit
            .saturating_add(failures.permanently_failed_count())
            .min(SEARCH_PAGE_CAP);

        let candidates = self.api.search_untagged_images(fetch_size).await?;
        let found = candidates.len();

        let batch: Vec<Asset> = candidates
            .into_iter()
            .filter(|asset| asset.kind == AssetKind::Image)
            .filter(|asset| !failures.is_permanently_failed(&asset.id))
            .take(limit)
            .collect();

        if batch.len() < found {
            debug!(
                "Discovery filtered {} of {} candidates (non-image or permanently failed)",
                found - batch.len(),
                found
            );
        }
        if batch.is_empty() {
            info!("Discovery exhausted, no eligible assets remain");
        }
        Ok(batch)
    }
}
