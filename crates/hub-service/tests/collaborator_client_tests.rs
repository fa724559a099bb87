//! Wire-level tests for the HTTP email relay and blob store clients,
//! using a mocked upstream.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use bytes::Bytes;
use hub_service::services::blob_store::{
    BlobStore, HttpBlobStore, StoredBlob, UnconfiguredBlobStore, UploadError, UploadMetadata,
};
use hub_service::services::notifier::{DeliveryError, HttpNotifier, Notifier};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Email relay
// ============================================================================

#[tokio::test]
async fn test_notifier_posts_json_message() -> Result<()> {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_json(json!({
            "to": "alice@example.com",
            "subject": "Hello",
            "body": "Line one\nLine two",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&relay)
        .await;

    let notifier = HttpNotifier::new(format!("{}/send", relay.uri()), TIMEOUT)?;
    notifier
        .send("alice@example.com", "Hello", "Line one\nLine two")
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_notifier_maps_rejection_status() -> Result<()> {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(550))
        .mount(&relay)
        .await;

    let notifier = HttpNotifier::new(relay.uri(), TIMEOUT)?;
    let result = notifier.send("bounce@example.com", "Hi", "body").await;
    assert_eq!(result, Err(DeliveryError::Rejected(550)));
    Ok(())
}

#[tokio::test]
async fn test_notifier_unreachable_relay() -> Result<()> {
    let relay = MockServer::start().await;
    let uri = relay.uri();
    drop(relay);

    let notifier = HttpNotifier::new(uri, Duration::from_millis(500))?;
    let result = notifier.send("alice@example.com", "Hi", "body").await;
    assert!(matches!(result, Err(DeliveryError::Unreachable(_))));
    Ok(())
}

// ============================================================================
// Blob store
// ============================================================================

#[tokio::test]
async fn test_blob_upload_sends_folder_and_content_type() -> Result<()> {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(query_param("folder", "meeting-recordings"))
        .and(header("content-type", "video/webm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://cdn.test/meeting-recordings/abc",
            "id": "meeting-recordings/abc",
        })))
        .expect(1)
        .mount(&store)
        .await;

    let client = HttpBlobStore::new(format!("{}/", store.uri()), TIMEOUT)?;
    let stored = client
        .upload(
            Bytes::from_static(b"recording"),
            UploadMetadata {
                folder: "meeting-recordings".to_string(),
                content_type: "video/webm".to_string(),
            },
        )
        .await?;

    assert_eq!(
        stored,
        StoredBlob {
            url: "https://cdn.test/meeting-recordings/abc".to_string(),
            id: "meeting-recordings/abc".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_blob_upload_error_mapping() -> Result<()> {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("folder", "avatars"))
        .respond_with(ResponseTemplate::new(413))
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(query_param("folder", "garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&store)
        .await;

    let client = HttpBlobStore::new(store.uri(), TIMEOUT)?;
    let metadata = |folder: &str| UploadMetadata {
        folder: folder.to_string(),
        content_type: "image/png".to_string(),
    };

    let rejected = client
        .upload(Bytes::from_static(b"png"), metadata("avatars"))
        .await;
    assert_eq!(rejected, Err(UploadError::Rejected(413)));

    let garbled = client
        .upload(Bytes::from_static(b"png"), metadata("garbled"))
        .await;
    assert!(matches!(garbled, Err(UploadError::InvalidResponse(_))));
    Ok(())
}

#[tokio::test]
async fn test_blob_delete() -> Result<()> {
    let store = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/objects/avatars/old"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&store)
        .await;

    let client = HttpBlobStore::new(store.uri(), TIMEOUT)?;
    client.delete("avatars/old").await?;

    let missing = client.delete("avatars/missing").await;
    assert_eq!(missing, Err(UploadError::Rejected(404)));
    Ok(())
}

#[tokio::test]
async fn test_unconfigured_blob_store_always_fails() {
    let store = UnconfiguredBlobStore;
    let upload = store
        .upload(
            Bytes::from_static(b"x"),
            UploadMetadata {
                folder: "avatars".to_string(),
                content_type: "image/png".to_string(),
            },
        )
        .await;
    assert_eq!(upload, Err(UploadError::NotConfigured));
    assert_eq!(store.delete("avatars/x").await, Err(UploadError::NotConfigured));
}
