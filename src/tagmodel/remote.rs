//! HTTP client for a sidecar inference service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::gallery::RequestRetryPolicy;

use super::{ModelError, TagModel, TagPrediction};

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<TagPrediction>,
}

/// Client for an inference sidecar exposing `POST /predict`.
///
/// The sidecar receives the raw image bytes and answers with a JSON list of
/// (name, confidence) pairs, sorted by confidence descending.
pub struct RemoteTagModel {
    client: reqwest::Client,
    base_url: String,
    retry: RequestRetryPolicy,
}

impl RemoteTagModel {
    pub fn new(
        base_url: &str,
        timeout_sec: u64,
        retry: RequestRetryPolicy,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .map_err(|e| ModelError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn predict_once(&self, image: &[u8]) -> Result<Vec<TagPrediction>, ModelError> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        debug!("Model returned {} predictions", parsed.predictions.len());
        Ok(parsed.predictions)
    }
}

#[async_trait]
impl TagModel for RemoteTagModel {
    async fn predict(&self, image: &[u8]) -> Result<Vec<TagPrediction>, ModelError> {
        let mut attempt = 0u32;
        loop {
            match self.predict_once(image).await {
                Ok(predictions) => return Ok(predictions),
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        "Transient inference error (attempt {}/{}), retrying in {:?}: {}",
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
}
