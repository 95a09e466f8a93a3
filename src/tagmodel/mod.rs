//! Tag-inference collaborator.
//!
//! The model itself is a black box living outside this process; the engine
//! only knows it turns image bytes into (tag name, confidence) pairs. The
//! trait seam keeps the engine testable without a model in the loop.

mod remote;

pub use remote::RemoteTagModel;

use async_trait::async_trait;
use serde::Deserialize;

/// One predicted tag with its confidence in `[0, 1]`.
#[derive(Debug, Clone, Deserialize)]
pub struct TagPrediction {
    pub name: String,
    pub confidence: f32,
}

/// Errors from the inference collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("inference request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse prediction response: {0}")]
    Parse(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Connection(_) | ModelError::Timeout => true,
            ModelError::Status { status, .. } => *status >= 500,
            ModelError::Parse(_) => false,
        }
    }
}

/// External inference model: image bytes in, ordered predictions out.
#[async_trait]
pub trait TagModel: Send + Sync {
    async fn predict(&self, image: &[u8]) -> Result<Vec<TagPrediction>, ModelError>;
}
