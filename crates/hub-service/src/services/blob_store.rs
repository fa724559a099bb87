//! Binary object storage for avatars and meeting recordings.

use bytes::Bytes;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

pub const AVATAR_FOLDER: &str = "avatars";
pub const RECORDING_FOLDER: &str = "meeting-recordings";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Blob store not configured")]
    NotConfigured,

    #[error("Blob store unreachable: {0}")]
    Unreachable(String),

    #[error("Blob store rejected request with status {0}")]
    Rejected(u16),

    #[error("Blob store returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub folder: String,
    pub content_type: String,
}

/// Location of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub url: String,
    pub id: String,
}

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, data: Bytes, metadata: UploadMetadata)
        -> Result<StoredBlob, UploadError>;

    async fn delete(&self, id: &str) -> Result<(), UploadError>;
}

/// Blob store client speaking a minimal HTTP protocol:
///
/// - `POST {base}/upload?folder=<folder>` with the raw body, answered by
///   `{"url": "...", "id": "..."}`
/// - `DELETE {base}/objects/<id>`
#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
}

impl HttpBlobStore {
    /// # Errors
    ///
    /// Returns `UploadError::Unreachable` if the HTTP client cannot be built.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| UploadError::Unreachable(format!("client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    #[instrument(skip_all, name = "hub.blob_store.upload", fields(folder = %metadata.folder, size = data.len()))]
    async fn upload(
        &self,
        data: Bytes,
        metadata: UploadMetadata,
    ) -> Result<StoredBlob, UploadError> {
        let url = format!("{}/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("folder", metadata.folder.as_str())])
            .header(header::CONTENT_TYPE, metadata.content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| UploadError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(status.as_u16()));
        }

        response
            .json::<StoredBlob>()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))
    }

    #[instrument(skip_all, name = "hub.blob_store.delete")]
    async fn delete(&self, id: &str) -> Result<(), UploadError> {
        let url = format!("{}/objects/{}", self.base_url, id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| UploadError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Stand-in used when `BLOB_STORE_URL` is unset. Every call fails.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredBlobStore;

#[async_trait::async_trait]
impl BlobStore for UnconfiguredBlobStore {
    async fn upload(&self, _: Bytes, _: UploadMetadata) -> Result<StoredBlob, UploadError> {
        Err(UploadError::NotConfigured)
    }

    async fn delete(&self, _: &str) -> Result<(), UploadError> {
        Err(UploadError::NotConfigured)
    }
}
