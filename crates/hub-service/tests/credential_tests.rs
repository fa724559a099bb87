//! Integration tests for the credential service.
//!
//! Registration rules, login, password change and reset, email verification,
//! avatar replacement and profile edits, all over in-memory backends.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use bytes::Bytes;
use chrono::{Duration, NaiveDate, Utc};
use common::secret::SecretString;
use hub_service::crypto;
use hub_service::errors::HubError;
use hub_service::models::{OneTimeToken, ProfileUpdate, PublicUser, User};
use hub_service::repositories::UserRepository;
use hub_service::routes::AppState;
use hub_service::services::notifier::{EMAIL_VERIFICATION_SUBJECT, PASSWORD_RESET_SUBJECT};
use hub_test_utils::{test_config, test_config_with, TestBackends, TEST_FRONTEND_URL, TEST_PASSWORD};

fn password(value: &str) -> SecretString {
    SecretString::from(value)
}

fn setup() -> (TestBackends, AppState) {
    let backends = TestBackends::new();
    let state = backends.app_state(test_config());
    (backends, state)
}

async fn register_alice(state: &AppState) -> User {
    state
        .credentials
        .register("alice", "alice@example.com", &password(TEST_PASSWORD))
        .await
        .expect("registration should succeed")
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_normalizes_and_hashes() -> Result<()> {
    let (_backends, state) = setup();

    let user = state
        .credentials
        .register("  Alice ", "ALICE@Example.COM", &password(TEST_PASSWORD))
        .await?;

    assert_eq!(user.username, "alice");
    assert_eq!(user.email, "alice@example.com");
    assert_ne!(user.password_hash, TEST_PASSWORD);
    assert!(user.password_hash.starts_with("$2"));
    assert!(!user.is_email_verified);
    assert_eq!(user.firstname.as_deref(), Some("user_"));
    assert_eq!(user.lastname.as_deref(), Some("alice"));
    Ok(())
}

#[tokio::test]
async fn test_register_applies_default_avatar() -> Result<()> {
    let backends = TestBackends::new();
    let state = backends.app_state(test_config_with(&[(
        "DEFAULT_AVATAR_URL",
        "https://cdn.test/default.png",
    )]));

    let user = register_alice(&state).await;
    assert_eq!(user.avatar_url.as_deref(), Some("https://cdn.test/default.png"));
    assert!(user.avatar_id.is_none());
    Ok(())
}

#[tokio::test]
async fn test_register_validation() {
    let (_backends, state) = setup();
    let cases = [
        ("ab", "ab@example.com", TEST_PASSWORD),
        ("has space", "space@example.com", TEST_PASSWORD),
        ("bob", "not-an-email", TEST_PASSWORD),
        ("bob", "bob@example.com", "short"),
    ];

    for (username, email, pw) in cases {
        let result = state.credentials.register(username, email, &password(pw)).await;
        assert!(
            matches!(result, Err(HubError::Validation(_))),
            "expected validation error for ({}, {})",
            username,
            email
        );
    }
}

#[tokio::test]
async fn test_register_duplicates_conflict_case_insensitively() -> Result<()> {
    let (backends, state) = setup();
    register_alice(&state).await;

    let same_email = state
        .credentials
        .register("alice2", "Alice@Example.com", &password(TEST_PASSWORD))
        .await;
    assert!(matches!(same_email, Err(HubError::Conflict(_))));

    let same_username = state
        .credentials
        .register("ALICE", "other@example.com", &password(TEST_PASSWORD))
        .await;
    assert!(matches!(same_username, Err(HubError::Conflict(_))));

    assert_eq!(backends.users.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_public_projection_hides_secrets() -> Result<()> {
    let (_backends, state) = setup();
    let user = register_alice(&state).await;
    state.tokens.issue_token_pair(user.user_id).await?;

    let stored = state.credentials.get_user(user.user_id).await?;
    let json = serde_json::to_value(PublicUser::from(&stored))?;

    assert_eq!(json["username"], "alice");
    assert!(json.get("passwordHash").is_none());
    assert!(json.get("refreshTokenHash").is_none());
    assert!(json.get("passwordReset").is_none());
    assert!(json.get("emailVerification").is_none());
    Ok(())
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_authenticate_by_username_or_email() -> Result<()> {
    let (_backends, state) = setup();
    let user = register_alice(&state).await;

    let by_name = state
        .credentials
        .authenticate(Some("Alice"), None, &password(TEST_PASSWORD))
        .await?;
    assert_eq!(by_name.user_id, user.user_id);

    let by_email = state
        .credentials
        .authenticate(None, Some(" ALICE@example.com "), &password(TEST_PASSWORD))
        .await?;
    assert_eq!(by_email.user_id, user.user_id);
    Ok(())
}

#[tokio::test]
async fn test_authenticate_failures() -> Result<()> {
    let (_backends, state) = setup();
    register_alice(&state).await;

    let unknown = state
        .credentials
        .authenticate(Some("nobody"), None, &password(TEST_PASSWORD))
        .await;
    assert!(matches!(unknown, Err(HubError::NotFound(_))));

    let wrong = state
        .credentials
        .authenticate(Some("alice"), None, &password("wrong-password"))
        .await;
    assert!(matches!(wrong, Err(HubError::Unauthorized(_))));

    let neither = state
        .credentials
        .authenticate(None, Some("  "), &password(TEST_PASSWORD))
        .await;
    assert!(matches!(neither, Err(HubError::Validation(_))));
    Ok(())
}

// ============================================================================
// Password change and reset
// ============================================================================

#[tokio::test]
async fn test_change_password() -> Result<()> {
    let (_backends, state) = setup();
    let user = register_alice(&state).await;

    let wrong_current = state
        .credentials
        .change_password(user.user_id, &password("not-my-password"), &password("brand-new-pass"))
        .await;
    assert!(matches!(wrong_current, Err(HubError::Unauthorized(_))));

    let too_short = state
        .credentials
        .change_password(user.user_id, &password(TEST_PASSWORD), &password("short"))
        .await;
    assert!(matches!(too_short, Err(HubError::Validation(_))));

    state
        .credentials
        .change_password(user.user_id, &password(TEST_PASSWORD), &password("brand-new-pass"))
        .await?;

    let old = state
        .credentials
        .authenticate(Some("alice"), None, &password(TEST_PASSWORD))
        .await;
    assert!(matches!(old, Err(HubError::Unauthorized(_))));
    state
        .credentials
        .authenticate(Some("alice"), None, &password("brand-new-pass"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_password_reset_flow() -> Result<()> {
    let (backends, state) = setup();
    let user = register_alice(&state).await;

    state.credentials.send_password_reset("Alice@Example.com").await?;

    let sent = backends.notifier.sent_to("alice@example.com");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent.first().unwrap().subject, PASSWORD_RESET_SUBJECT);
    assert!(sent
        .first()
        .unwrap()
        .body
        .contains(&format!("{}/reset-password/", TEST_FRONTEND_URL)));

    let raw = backends
        .notifier
        .last_token("alice@example.com", "reset-password")
        .expect("reset link in email");

    let stored = backends.users.get(user.user_id).unwrap();
    let pending = stored.password_reset.expect("reset pending");
    assert_eq!(pending.token_hash, crypto::hash_token(&raw));
    assert_ne!(pending.token_hash, raw);

    let reset_user = state
        .credentials
        .complete_password_reset(&raw, &password("reset-password-1"))
        .await?;
    assert_eq!(reset_user, user.user_id);
    assert!(backends.users.get(user.user_id).unwrap().password_reset.is_none());

    state
        .credentials
        .authenticate(Some("alice"), None, &password("reset-password-1"))
        .await?;

    let reused = state
        .credentials
        .complete_password_reset(&raw, &password("reset-password-2"))
        .await;
    assert!(matches!(reused, Err(HubError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_password_reset_unknown_email_and_expired_token() -> Result<()> {
    let (backends, state) = setup();
    let user = register_alice(&state).await;

    let unknown = state.credentials.send_password_reset("ghost@example.com").await;
    assert!(matches!(unknown, Err(HubError::NotFound(_))));

    let raw = "a".repeat(64);
    backends
        .users
        .set_password_reset(
            user.user_id,
            Some(OneTimeToken {
                token_hash: crypto::hash_token(&raw),
                expires_at: Utc::now() - Duration::minutes(1),
            }),
        )
        .await?;

    let expired = state
        .credentials
        .complete_password_reset(&raw, &password("reset-password-1"))
        .await;
    assert!(matches!(expired, Err(HubError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_password_reset_delivery_failure() -> Result<()> {
    let (backends, state) = setup();
    register_alice(&state).await;
    backends.notifier.fail_all();

    let result = state.credentials.send_password_reset("alice@example.com").await;
    assert!(matches!(result, Err(HubError::Collaborator(_))));
    Ok(())
}

// ============================================================================
// Email verification
// ============================================================================

#[tokio::test]
async fn test_email_verification_flow() -> Result<()> {
    let (backends, state) = setup();
    let user = register_alice(&state).await;

    state.credentials.send_email_verification(user.user_id).await?;
    let sent = backends.notifier.sent_to("alice@example.com");
    assert_eq!(sent.first().unwrap().subject, EMAIL_VERIFICATION_SUBJECT);

    let raw = backends
        .notifier
        .last_token("alice@example.com", "verify-email")
        .expect("verification link in email");

    let verified = state.credentials.complete_email_verification(&raw).await?;
    assert_eq!(verified, user.user_id);

    let stored = backends.users.get(user.user_id).unwrap();
    assert!(stored.is_email_verified);
    assert!(stored.email_verification.is_none());

    let again = state.credentials.send_email_verification(user.user_id).await;
    assert!(matches!(again, Err(HubError::Conflict(_))));

    let bogus = state.credentials.complete_email_verification("deadbeef").await;
    assert!(matches!(bogus, Err(HubError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_verification_delivery_failure() -> Result<()> {
    let (backends, state) = setup();
    let user = register_alice(&state).await;
    backends.notifier.fail_for("alice@example.com");

    let result = state.credentials.send_email_verification(user.user_id).await;
    assert!(matches!(result, Err(HubError::Collaborator(_))));
    Ok(())
}

// ============================================================================
// Avatar and profile
// ============================================================================

#[tokio::test]
async fn test_avatar_replacement_deletes_previous_blob() -> Result<()> {
    let (backends, state) = setup();
    let user = register_alice(&state).await;

    let first = state
        .credentials
        .update_avatar(user.user_id, Bytes::from_static(b"png-1"), "image/png")
        .await?;
    let first_id = first.avatar_id.clone().expect("avatar id stored");
    assert!(first_id.starts_with("avatars/"));
    assert_eq!(
        backends.blob_store.metadata(&first_id).map(|m| m.content_type),
        Some("image/png".to_string())
    );

    let second = state
        .credentials
        .update_avatar(user.user_id, Bytes::from_static(b"png-2"), "image/png")
        .await?;
    assert_ne!(second.avatar_url, first.avatar_url);
    assert_eq!(backends.blob_store.deleted(), vec![first_id]);
    assert_eq!(backends.blob_store.object_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_avatar_upload_failures() -> Result<()> {
    let (backends, state) = setup();
    let user = register_alice(&state).await;

    let empty = state
        .credentials
        .update_avatar(user.user_id, Bytes::new(), "image/png")
        .await;
    assert!(matches!(empty, Err(HubError::Validation(_))));

    backends.blob_store.set_unavailable();
    let offline = state
        .credentials
        .update_avatar(user.user_id, Bytes::from_static(b"png"), "image/png")
        .await;
    assert!(matches!(offline, Err(HubError::Collaborator(_))));
    assert!(backends.users.get(user.user_id).unwrap().avatar_id.is_none());
    Ok(())
}

#[tokio::test]
async fn test_edit_profile_keeps_unset_fields() -> Result<()> {
    let (_backends, state) = setup();
    let user = register_alice(&state).await;

    let updated = state
        .credentials
        .edit_profile(
            user.user_id,
            &ProfileUpdate {
                bio: Some("Hello".to_string()),
                dob: NaiveDate::from_ymd_opt(1990, 4, 2),
                ..ProfileUpdate::default()
            },
        )
        .await?;

    assert_eq!(updated.bio.as_deref(), Some("Hello"));
    assert_eq!(updated.dob, NaiveDate::from_ymd_opt(1990, 4, 2));
    assert_eq!(updated.firstname.as_deref(), Some("user_"));
    assert_eq!(updated.lastname.as_deref(), Some("alice"));

    let missing = state
        .credentials
        .edit_profile(uuid::Uuid::new_v4(), &ProfileUpdate::default())
        .await;
    assert!(matches!(missing, Err(HubError::NotFound(_))));
    Ok(())
}
