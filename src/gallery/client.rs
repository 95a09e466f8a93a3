//! HTTP client for the gallery service.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::models::{
    Asset, AssetKind, BulkTagRequest, CreateTagRequest, GalleryError, MetadataSearchRequest,
    MetadataSearchResponse, RemoteTag,
};
use super::retry::RequestRetryPolicy;
use super::GalleryApi;

/// HTTP client for one gallery account.
///
/// Wraps every call in the transient-retry policy; errors that survive the
/// retries are returned to the engine, which decides whether they count
/// against an asset's failure budget.
pub struct GalleryClient {
    client: reqwest::Client,
    base_url: String,
    retry: RequestRetryPolicy,
}

impl GalleryClient {
    /// Create a new gallery client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the gallery (e.g., "https://photos.example.com")
    /// * `api_key` - Opaque credential sent as `X-API-Key` on every request
    /// * `timeout_sec` - Per-request timeout in seconds
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout_sec: u64,
        retry: RequestRetryPolicy,
    ) -> Result<Self, GalleryError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut key_value = reqwest::header::HeaderValue::from_str(api_key)
            .map_err(|e| GalleryError::Connection(format!("invalid api key: {}", e)))?;
        key_value.set_sensitive(true);
        headers.insert("X-API-Key", key_value);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .default_headers(headers)
            .build()
            .map_err(GalleryError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Get the base URL of the gallery.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, GalleryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GalleryError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        "Transient error during {} (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt + 1,
                        self.retry.max_attempts,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Turn a non-success response into a `GalleryError::Status`.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GalleryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GalleryError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn search_once(&self, limit: usize) -> Result<Vec<Asset>, GalleryError> {
        let request = MetadataSearchRequest {
            tag_ids: None,
            kind: AssetKind::Image,
            size: limit,
        };
        let response = self
            .client
            .post(self.url("/api/search/metadata"))
            .json(&request)
            .send()
            .await
            .map_err(GalleryError::from_reqwest)?;
        let response = Self::check_status(response).await?;
        let parsed: MetadataSearchResponse = response
            .json()
            .await
            .map_err(|e| GalleryError::Parse(e.to_string()))?;
        debug!(
            "Metadata search returned {} assets ({} total available)",
            parsed.assets.items.len(),
            parsed.assets.total
        );
        Ok(parsed.assets.items)
    }

    async fn fetch_thumbnail_once(&self, asset_id: &str) -> Result<Vec<u8>, GalleryError> {
        let response = self
            .client
            .get(self.url(&format!("/api/assets/{}/thumbnail", asset_id)))
            .send()
            .await
            .map_err(GalleryError::from_reqwest)?;
        let response = Self::check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(GalleryError::from_reqwest)?;
        Ok(bytes.to_vec())
    }

    async fn list_tags_once(&self) -> Result<Vec<RemoteTag>, GalleryError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(GalleryError::from_reqwest)?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| GalleryError::Parse(e.to_string()))
    }

    async fn create_tag_once(&self, name: &str) -> Result<RemoteTag, GalleryError> {
        let request = CreateTagRequest {
            name: name.to_string(),
        };
        let response = self
            .client
            .post(self.url("/api/tags"))
            .json(&request)
            .send()
            .await
            .map_err(GalleryError::from_reqwest)?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| GalleryError::Parse(e.to_string()))
    }

    async fn tag_assets_once(
        &self,
        asset_ids: &[String],
        tag_ids: &[String],
    ) -> Result<(), GalleryError> {
        let request = BulkTagRequest {
            asset_ids: asset_ids.to_vec(),
            tag_ids: tag_ids.to_vec(),
        };
        let response = self
            .client
            .put(self.url("/api/tags/assets"))
            .json(&request)
            .send()
            .await
            .map_err(GalleryError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn ping_once(&self) -> Result<(), GalleryError> {
        let response = self
            .client
            .get(self.url("/api/server/ping"))
            .send()
            .await
            .map_err(GalleryError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl GalleryApi for GalleryClient {
    async fn search_untagged_images(&self, limit: usize) -> Result<Vec<Asset>, GalleryError> {
        self.with_retry("metadata search", || self.search_once(limit))
            .await
    }

    async fn fetch_thumbnail(&self, asset_id: &str) -> Result<Vec<u8>, GalleryError> {
        self.with_retry("thumbnail fetch", || self.fetch_thumbnail_once(asset_id))
            .await
    }

    async fn list_tags(&self) -> Result<Vec<RemoteTag>, GalleryError> {
        self.with_retry("tag list", || self.list_tags_once()).await
    }

    async fn create_tag(&self, name: &str) -> Result<RemoteTag, GalleryError> {
        self.with_retry("tag create", || self.create_tag_once(name))
            .await
    }

    async fn tag_assets(
        &self,
        asset_ids: &[String],
        tag_ids: &[String],
    ) -> Result<(), GalleryError> {
        self.with_retry("bulk tag apply", || {
            self.tag_assets_once(asset_ids, tag_ids)
        })
        .await
    }

    async fn ping(&self) -> Result<(), GalleryError> {
        self.with_retry("ping", || self.ping_once()).await
    }
}
