//! Models for the remote gallery service API.
//!
//! These types match the JSON structures exchanged with the gallery's REST
//! API. Unknown response fields are ignored so that server upgrades do not
//! break deserialization.

use serde::{Deserialize, Serialize};

/// Kind of media an asset holds. Only images are eligible for tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetKind {
    Image,
    Video,
    #[serde(other)]
    Other,
}

/// A media asset as returned by the gallery's metadata search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    #[serde(default)]
    pub original_file_name: String,
}

/// A tag as owned by the gallery. The gallery is the single source of truth
/// for tag identity; ids are never invented locally.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTag {
    pub id: String,
    pub name: String,
}

/// Body for `POST /api/search/metadata`.
///
/// `tag_ids: None` serializes to `null`, which the gallery interprets as
/// "assets carrying no tags at all". This is what makes discovery
/// self-terminating: once an asset receives the processed marker it stops
/// matching this search.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSearchRequest {
    pub tag_ids: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub size: usize,
}

/// Response envelope for the metadata search.
#[derive(Debug, Deserialize)]
pub struct MetadataSearchResponse {
    pub assets: SearchAssetsPage,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchAssetsPage {
    #[serde(default)]
    pub items: Vec<Asset>,
    #[serde(default)]
    pub total: u64,
}

/// Body for `POST /api/tags`.
#[derive(Debug, Serialize)]
pub struct CreateTagRequest {
    pub name: String,
}

/// Body for `PUT /api/tags/assets` (bulk tag assignment).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTagRequest {
    pub asset_ids: Vec<String>,
    pub tag_ids: Vec<String>,
}

/// Errors from the gallery client, classified for retry decisions.
#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl GalleryError {
    /// Transient errors are retried with backoff inside the client and never
    /// surface as asset failures when they eventually succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GalleryError::Connection(_) | GalleryError::Timeout => true,
            GalleryError::Status { status, .. } => *status >= 500,
            GalleryError::Parse(_) => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GalleryError::Timeout
        } else {
            GalleryError::Connection(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_deserialization_ignores_unknown_fields() {
        let json = r#"{
            "id": "abc-123",
            "type": "IMAGE",
            "originalFileName": "cat.jpg",
            "checksum": "deadbeef",
            "isFavorite": false
        }"#;
        let asset: Asset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.id, "abc-123");
        assert_eq!(asset.kind, AssetKind::Image);
        assert_eq!(asset.original_file_name, "cat.jpg");
    }

    #[test]
    fn test_unknown_asset_kind_maps_to_other() {
        let json = r#"{"id": "x", "type": "AUDIO"}"#;
        let asset: Asset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.kind, AssetKind::Other);
    }

    #[test]
    fn test_search_request_serializes_null_tag_ids() {
        let request = MetadataSearchRequest {
            tag_ids: None,
            kind: AssetKind::Image,
            size: 25,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["tagIds"].is_null());
        assert_eq!(json["type"], "IMAGE");
        assert_eq!(json["size"], 25);
    }

    #[test]
    fn test_bulk_tag_request_field_names() {
        let request = BulkTagRequest {
            asset_ids: vec!["a1".into()],
            tag_ids: vec!["t1".into(), "t2".into()],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["assetIds"][0], "a1");
        assert_eq!(json["tagIds"][1], "t2");
    }

    #[test]
    fn test_error_transience_classification() {
        assert!(GalleryError::Connection("refused".into()).is_transient());
        assert!(GalleryError::Timeout.is_transient());
        assert!(GalleryError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!GalleryError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!GalleryError::Parse("bad json".into()).is_transient());
    }
}
