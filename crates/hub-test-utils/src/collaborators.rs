//! Fake notifier and blob store.

use async_trait::async_trait;
use bytes::Bytes;
use hub_service::services::blob_store::{BlobStore, StoredBlob, UploadError, UploadMetadata};
use hub_service::services::notifier::{DeliveryError, Notifier};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// One captured email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Notifier that records every message and can be told to reject
/// particular recipients (or everyone).
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to `recipient` will fail with `DeliveryError::Rejected(550)`.
    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    pub fn fail_all(&self) {
        *self.fail_all.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipient == recipient)
            .collect()
    }

    /// Extract the raw token from the last link sent to `recipient` under
    /// `{frontend}/{path}/{token}`.
    pub fn last_token(&self, recipient: &str, path: &str) -> Option<String> {
        let marker = format!("/{}/", path);
        self.sent_to(recipient).iter().rev().find_map(|m| {
            m.body.split_whitespace().find_map(|word| {
                word.split_once(&marker)
                    .map(|(_, token)| token.trim_end_matches(['.', ',', ')']).to_string())
            })
        })
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        if *self.fail_all.lock().unwrap() || self.failing.lock().unwrap().contains(recipient) {
            return Err(DeliveryError::Rejected(550));
        }
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Blob store that keeps uploads in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (UploadMetadata, Bytes)>>,
    deleted: Mutex<Vec<String>>,
    unavailable: Mutex<bool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails with `UploadError::Unreachable`.
    pub fn set_unavailable(&self) {
        *self.unavailable.lock().unwrap() = true;
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn metadata(&self, id: &str) -> Option<UploadMetadata> {
        self.objects.lock().unwrap().get(id).map(|(m, _)| m.clone())
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), UploadError> {
        if *self.unavailable.lock().unwrap() {
            return Err(UploadError::Unreachable("blob store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, data: Bytes, metadata: UploadMetadata) -> Result<StoredBlob, UploadError> {
        self.check_available()?;
        let id = format!("{}/{}", metadata.folder, uuid::Uuid::new_v4());
        let url = format!("https://blobs.test/{}", id);
        self.objects
            .lock()
            .unwrap()
            .insert(id.clone(), (metadata, data));
        Ok(StoredBlob { url, id })
    }

    async fn delete(&self, id: &str) -> Result<(), UploadError> {
        self.check_available()?;
        self.objects.lock().unwrap().remove(id);
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }
}
