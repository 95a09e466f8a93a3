//! Tag name to remote-identifier resolution with TTL-based caching.
//!
//! The gallery owns tag identity, so the cache only ever holds identifiers
//! obtained from the remote tag list or a create call. There is no
//! subscription to remote tag changes; staleness is bounded by the TTL and
//! by the create-conflict fallback below.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::gallery::{GalleryApi, GalleryError};

/// Normalize a tag name for lookup: trimmed, lowercased.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Names the gallery would reject are dropped before resolution.
pub fn is_valid_tag_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > 100 {
        return false;
    }
    !name.contains(['\n', '\r', '\t'])
}

/// Cache of normalized tag name → remote tag id for one account.
pub struct TagCache {
    api: Arc<dyn GalleryApi>,
    entries: HashMap<String, String>,
    refreshed_at: Option<Instant>,
    ttl: Duration,
}

impl TagCache {
    pub fn new(api: Arc<dyn GalleryApi>, ttl: Duration) -> Self {
        Self {
            api,
            entries: HashMap::new(),
            refreshed_at: None,
            ttl,
        }
    }

    /// Resolve each name to a remote tag identifier.
    ///
    /// Fresh cache entries are used directly. Anything missing triggers at
    /// most one wholesale refresh of the remote tag list, and names still
    /// unresolved after that are created remotely. A create that fails
    /// because another writer won the race falls back to refetch-and-resolve
    /// instead of surfacing the error.
    ///
    /// Invalid names are silently dropped; the returned map is keyed by
    /// normalized name.
    pub async fn resolve(
        &mut self,
        names: &[String],
    ) -> Result<HashMap<String, String>, GalleryError> {
        let mut wanted: Vec<String> = Vec::new();
        for name in names {
            if !is_valid_tag_name(name) {
                debug!("Dropping invalid tag name: {:?}", name);
                continue;
            }
            let normalized = normalize_tag_name(name);
            if !wanted.contains(&normalized) {
                wanted.push(normalized);
            }
        }

        let mut refreshed_this_call = false;
        if !self.is_fresh() {
            self.refresh().await?;
            refreshed_this_call = true;
        }

        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        for name in wanted {
            match self.entries.get(&name) {
                Some(id) => {
                    resolved.insert(name, id.clone());
                }
                None => missing.push(name),
            }
        }

        // Re-check after a refresh in case another process created the tag
        // since our cache was last populated.
        if !missing.is_empty() && !refreshed_this_call {
            self.refresh().await?;
            missing.retain(|name| match self.entries.get(name) {
                Some(id) => {
                    resolved.insert(name.clone(), id.clone());
                    false
                }
                None => true,
            });
        }

        for name in missing {
            let id = self.create_or_refetch(&name).await?;
            resolved.insert(name, id);
        }

        Ok(resolved)
    }

    /// Create `name` remotely, falling back to refetch on a create conflict.
    async fn create_or_refetch(&mut self, name: &str) -> Result<String, GalleryError> {
        match self.api.create_tag(name).await {
            Ok(tag) => {
                debug!("Created tag {:?} -> {}", tag.name, tag.id);
                self.entries
                    .insert(normalize_tag_name(&tag.name), tag.id.clone());
                Ok(tag.id)
            }
            Err(e) if !e.is_transient() => {
                // Most likely a lost create race with another writer.
                debug!(
                    "Tag create for {:?} failed ({}), refetching tag list",
                    name, e
                );
                self.refresh().await?;
                match self.entries.get(name) {
                    Some(id) => Ok(id.clone()),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the whole cache with the remote tag list.
    async fn refresh(&mut self) -> Result<(), GalleryError> {
        let tags = self.api.list_tags().await?;
        self.entries = tags
            .into_iter()
            .map(|tag| (normalize_tag_name(&tag.name), tag.id))
            .collect();
        self.refreshed_at = Some(Instant::now());
        info!("Refreshed tag cache ({} tags)", self.entries.len());
        Ok(())
    }

    /// Force a refresh on the next resolve.
    pub fn invalidate(&mut self) {
        self.refreshed_at = None;
        self.entries.clear();
        debug!("Tag cache invalidated");
    }

    fn is_fresh(&self) -> bool {
        self.refreshed_at
            .map(|at| at.elapsed() < self.ttl)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeGallery;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn test_normalize_tag_name() {
        assert_eq!(normalize_tag_name("  Cat_Ears "), "cat_ears");
        assert_eq!(normalize_tag_name("BLURRY"), "blurry");
    }

    #[test]
    fn test_tag_name_validation() {
        assert!(is_valid_tag_name("cat_ears"));
        assert!(is_valid_tag_name("  padded  "));
        assert!(!is_valid_tag_name(""));
        assert!(!is_valid_tag_name("   "));
        assert!(!is_valid_tag_name("line\nbreak"));
        assert!(!is_valid_tag_name(&"x".repeat(101)));
    }

    #[tokio::test]
    async fn test_resolve_uses_existing_remote_tags() {
        let gallery = FakeGallery::new();
        gallery.add_tag("t1", "cat_ears");
        let api = Arc::new(gallery);
        let mut cache = TagCache::new(api.clone(), LONG_TTL);

        let resolved = cache.resolve(&["Cat_Ears".to_string()]).await.unwrap();
        assert_eq!(resolved["cat_ears"], "t1");
        assert_eq!(api.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_resolve_within_ttl_makes_no_remote_calls() {
        let gallery = FakeGallery::new();
        gallery.add_tag("t1", "cat_ears");
        let api = Arc::new(gallery);
        let mut cache = TagCache::new(api.clone(), LONG_TTL);

        cache.resolve(&["cat_ears".to_string()]).await.unwrap();
        let list_calls_after_first = api.list_calls();

        cache.resolve(&["cat_ears".to_string()]).await.unwrap();
        assert_eq!(api.list_calls(), list_calls_after_first);
        assert_eq!(api.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_after_ttl_expiry_issues_exactly_one_refresh() {
        let gallery = FakeGallery::new();
        gallery.add_tag("t1", "cat_ears");
        let api = Arc::new(gallery);
        // Zero TTL: every resolve starts with an expired cache.
        let mut cache = TagCache::new(api.clone(), Duration::ZERO);

        cache.resolve(&["cat_ears".to_string()]).await.unwrap();
        assert_eq!(api.list_calls(), 1);

        cache.resolve(&["cat_ears".to_string()]).await.unwrap();
        assert_eq!(api.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_unresolved_names_are_created() {
        let api = Arc::new(FakeGallery::new());
        let mut cache = TagCache::new(api.clone(), LONG_TTL);

        let resolved = cache
            .resolve(&["brand_new".to_string(), "also_new".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(api.create_calls(), 2);

        // Created tags are cached; resolving again creates nothing.
        cache.resolve(&["brand_new".to_string()]).await.unwrap();
        assert_eq!(api.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_create_conflict_falls_back_to_refetch() {
        // Conflict mode: every create fails with "already exists" while the
        // tag appears in the remote list, as if another writer won the race.
        let gallery = FakeGallery::new();
        gallery.set_create_conflicts(true);
        let api = Arc::new(gallery);
        let mut cache = TagCache::new(api.clone(), LONG_TTL);

        let resolved = cache.resolve(&["sneaky".to_string()]).await.unwrap();
        assert!(resolved.contains_key("sneaky"));
        assert_eq!(api.create_calls(), 1);
        // Initial populate plus the conflict refetch.
        assert_eq!(api.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh_on_next_resolve() {
        let gallery = FakeGallery::new();
        gallery.add_tag("t1", "cat_ears");
        let api = Arc::new(gallery);
        let mut cache = TagCache::new(api.clone(), LONG_TTL);

        cache.resolve(&["cat_ears".to_string()]).await.unwrap();
        assert_eq!(api.list_calls(), 1);

        cache.invalidate();
        let resolved = cache.resolve(&["cat_ears".to_string()]).await.unwrap();
        assert_eq!(resolved["cat_ears"], "t1");
        assert_eq!(api.list_calls(), 2);
        assert_eq!(api.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_names_dropped_without_remote_calls() {
        let api = Arc::new(FakeGallery::new());
        let mut cache = TagCache::new(api.clone(), LONG_TTL);

        let resolved = cache
            .resolve(&["".to_string(), "bad\nname".to_string()])
            .await
            .unwrap();
        assert!(resolved.is_empty());
        assert_eq!(api.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_names_resolved_once() {
        let api = Arc::new(FakeGallery::new());
        let mut cache = TagCache::new(api.clone(), LONG_TTL);

        let resolved = cache
            .resolve(&["Dup".to_string(), "dup".to_string(), " DUP ".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(api.create_calls(), 1);
    }
}
