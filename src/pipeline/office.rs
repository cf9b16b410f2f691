//! Office-to-PDF conversion client.
//!
//! The converter is an external HTTP service: raw document bytes are POSTed
//! with `Content-Type: application/octet-stream` and the real media type in
//! a `Content-Type-Actual` header; HTTP 200 carries the PDF body, any other
//! status is a failure whose body explains why.

use crate::error::DocQuestError;
use crate::pipeline::input::{UploadedDocument, PDF_MEDIA_TYPE};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Header carrying the real media type of the posted bytes.
pub const CONTENT_TYPE_ACTUAL: &str = "Content-Type-Actual";

/// Converts a non-PDF upload into PDF bytes.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, document: &UploadedDocument) -> Result<Vec<u8>, DocQuestError>;
}

/// [`DocumentConverter`] backed by the conversion HTTP service.
#[derive(Debug, Clone)]
pub struct HttpConverter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpConverter {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, DocQuestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocQuestError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl DocumentConverter for HttpConverter {
    async fn convert(&self, document: &UploadedDocument) -> Result<Vec<u8>, DocQuestError> {
        info!(
            "Converting '{}' ({}) via {}",
            document.name, document.media_type, self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_TYPE_ACTUAL, document.media_type.as_str())
            .body(document.bytes.clone())
            .send()
            .await
            .map_err(|e| DocQuestError::ConversionUnavailable {
                name: document.name.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            warn!("Conversion of '{}' failed: HTTP {}", document.name, status);
            return Err(DocQuestError::ConversionFailed {
                name: document.name.clone(),
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DocQuestError::ConversionUnavailable {
                name: document.name.clone(),
                reason: e.to_string(),
            })?;
        info!("Converted '{}' → {} bytes of {}", document.name, bytes.len(), PDF_MEDIA_TYPE);
        Ok(bytes.to_vec())
    }
}
