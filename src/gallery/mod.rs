//! Client layer for the remote gallery service.
//!
//! The gallery owns asset and tag identity; this module only reads assets
//! and appends tags. All calls go through [`GalleryApi`] so the engine can
//! be exercised against in-memory fakes in tests.

mod client;
mod models;
mod retry;

pub use client::GalleryClient;
pub use models::{
    Asset, AssetKind, BulkTagRequest, CreateTagRequest, GalleryError, MetadataSearchRequest,
    MetadataSearchResponse, RemoteTag, SearchAssetsPage,
};
pub use retry::RequestRetryPolicy;

use async_trait::async_trait;

/// Remote gallery operations consumed by the engine.
#[async_trait]
pub trait GalleryApi: Send + Sync {
    /// Search for image assets that carry no tags at all, up to `limit`.
    async fn search_untagged_images(&self, limit: usize) -> Result<Vec<Asset>, GalleryError>;

    /// Fetch a displayable representation (thumbnail) of an asset.
    async fn fetch_thumbnail(&self, asset_id: &str) -> Result<Vec<u8>, GalleryError>;

    /// List every tag known to the gallery.
    async fn list_tags(&self) -> Result<Vec<RemoteTag>, GalleryError>;

    /// Create a tag and return its remote identity.
    async fn create_tag(&self, name: &str) -> Result<RemoteTag, GalleryError>;

    /// Assign a set of tags to a set of assets in one call.
    async fn tag_assets(&self, asset_ids: &[String], tag_ids: &[String])
        -> Result<(), GalleryError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), GalleryError>;
}
