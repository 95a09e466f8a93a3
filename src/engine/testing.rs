//! In-memory fakes for exercising the engine without a network.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::gallery::{Asset, AssetKind, GalleryApi, GalleryError, RemoteTag};
use crate::tagmodel::{ModelError, TagModel, TagPrediction};

pub fn image_asset(id: &str) -> Asset {
    Asset {
        id: id.to_string(),
        kind: AssetKind::Image,
        original_file_name: format!("{}.jpg", id),
    }
}

pub fn video_asset(id: &str) -> Asset {
    Asset {
        id: id.to_string(),
        kind: AssetKind::Video,
        original_file_name: format!("{}.mp4", id),
    }
}

#[derive(Default)]
struct FakeGalleryState {
    /// Assets that currently carry no tags (what the untagged search sees).
    untagged: Vec<Asset>,
    tags: Vec<RemoteTag>,
    /// asset id -> tag ids applied, in application order.
    applied: HashMap<String, Vec<String>>,
    /// Every bulk apply call as (asset_ids, tag_ids).
    apply_calls: Vec<(Vec<String>, Vec<String>)>,
    search_calls: usize,
    list_calls: usize,
    create_calls: usize,
    next_tag_seq: usize,
    fail_fetch: HashSet<String>,
    fail_apply: bool,
    fail_search: bool,
    create_conflicts: bool,
    reachable: bool,
}

/// Fake gallery backend with call counting.
///
/// A successful bulk apply removes the assets from the untagged pool, which
/// mirrors how the real search stops returning marked assets.
pub struct FakeGallery {
    state: Mutex<FakeGalleryState>,
}

impl FakeGallery {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeGalleryState {
                reachable: true,
                ..Default::default()
            }),
        }
    }

    pub fn add_untagged(&self, asset: Asset) {
        self.state.lock().unwrap().untagged.push(asset);
    }

    pub fn add_untagged_images(&self, ids: &[&str]) {
        for id in ids {
            self.add_untagged(image_asset(id));
        }
    }

    pub fn add_tag(&self, id: &str, name: &str) {
        self.state.lock().unwrap().tags.push(RemoteTag {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn fail_fetch_for(&self, asset_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_fetch
            .insert(asset_id.to_string());
    }

    pub fn set_fail_apply(&self, fail: bool) {
        self.state.lock().unwrap().fail_apply = fail;
    }

    pub fn set_fail_search(&self, fail: bool) {
        self.state.lock().unwrap().fail_search = fail;
    }

    pub fn set_create_conflicts(&self, conflicts: bool) {
        self.state.lock().unwrap().create_conflicts = conflicts;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn apply_calls(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.state.lock().unwrap().apply_calls.clone()
    }

    pub fn applied_tags(&self, asset_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .applied
            .get(asset_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tag_name(&self, tag_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .tags
            .iter()
            .find(|t| t.id == tag_id)
            .map(|t| t.name.clone())
    }

    pub fn untagged_count(&self) -> usize {
        self.state.lock().unwrap().untagged.len()
    }
}

#[async_trait]
impl GalleryApi for FakeGallery {
    async fn search_untagged_images(&self, limit: usize) -> Result<Vec<Asset>, GalleryError> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;
        if state.fail_search {
            return Err(GalleryError::Connection("search unavailable".into()));
        }
        Ok(state.untagged.iter().take(limit).cloned().collect())
    }

    async fn fetch_thumbnail(&self, asset_id: &str) -> Result<Vec<u8>, GalleryError> {
        let state = self.state.lock().unwrap();
        if state.fail_fetch.contains(asset_id) {
            return Err(GalleryError::Status {
                status: 404,
                body: "asset not found".into(),
            });
        }
        Ok(format!("thumbnail:{}", asset_id).into_bytes())
    }

    async fn list_tags(&self) -> Result<Vec<RemoteTag>, GalleryError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state.tags.clone())
    }

    async fn create_tag(&self, name: &str) -> Result<RemoteTag, GalleryError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        state.next_tag_seq += 1;
        let tag = RemoteTag {
            id: format!("tag-{}", state.next_tag_seq),
            name: name.to_string(),
        };
        state.tags.push(tag.clone());
        if state.create_conflicts {
            return Err(GalleryError::Status {
                status: 400,
                body: format!("Tag '{}' already exists", name),
            });
        }
        Ok(tag)
    }

    async fn tag_assets(
        &self,
        asset_ids: &[String],
        tag_ids: &[String],
    ) -> Result<(), GalleryError> {
        let mut state = self.state.lock().unwrap();
        state
            .apply_calls
            .push((asset_ids.to_vec(), tag_ids.to_vec()));
        if state.fail_apply {
            return Err(GalleryError::Status {
                status: 400,
                body: "invalid tag ids".into(),
            });
        }
        for asset_id in asset_ids {
            state
                .applied
                .entry(asset_id.clone())
                .or_default()
                .extend(tag_ids.iter().cloned());
        }
        // Tagged assets no longer match the untagged search.
        state.untagged.retain(|a| !asset_ids.contains(&a.id));
        Ok(())
    }

    async fn ping(&self) -> Result<(), GalleryError> {
        if self.state.lock().unwrap().reachable {
            Ok(())
        } else {
            Err(GalleryError::Connection("unreachable".into()))
        }
    }
}

/// Fake inference model returning canned predictions per asset thumbnail.
pub struct FakeModel {
    /// thumbnail bytes -> predictions; falls back to `default`.
    by_image: Mutex<HashMap<Vec<u8>, Vec<TagPrediction>>>,
    default: Vec<TagPrediction>,
    fail: Mutex<bool>,
}

impl FakeModel {
    pub fn returning(predictions: Vec<(&str, f32)>) -> Self {
        Self {
            by_image: Mutex::new(HashMap::new()),
            default: predictions
                .into_iter()
                .map(|(name, confidence)| TagPrediction {
                    name: name.to_string(),
                    confidence,
                })
                .collect(),
            fail: Mutex::new(false),
        }
    }

    pub fn empty() -> Self {
        Self::returning(vec![])
    }

    pub fn set_predictions_for(&self, asset_id: &str, predictions: Vec<(&str, f32)>) {
        let key = format!("thumbnail:{}", asset_id).into_bytes();
        self.by_image.lock().unwrap().insert(
            key,
            predictions
                .into_iter()
                .map(|(name, confidence)| TagPrediction {
                    name: name.to_string(),
                    confidence,
                })
                .collect(),
        );
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl TagModel for FakeModel {
    async fn predict(&self, image: &[u8]) -> Result<Vec<TagPrediction>, ModelError> {
        if *self.fail.lock().unwrap() {
            return Err(ModelError::Timeout);
        }
        Ok(self
            .by_image
            .lock()
            .unwrap()
            .get(image)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}
