//! Integration tests for session and room token handling.
//!
//! Covers refresh rotation (only the latest refresh token is honored),
//! concurrent refresh races, logout invalidation, access-token verification
//! and room tokens.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use common::secret::SecretString;
use hub_service::crypto::{self, RoomClaims};
use hub_service::errors::HubError;
use hub_service::models::User;
use hub_service::routes::AppState;
use hub_test_utils::{test_config, TestBackends, TEST_PASSWORD, TEST_ROOM_SECRET};
use std::sync::Arc;

async fn setup() -> (TestBackends, AppState, User) {
    let backends = TestBackends::new();
    let state = backends.app_state(test_config());
    let user = state
        .credentials
        .register("alice", "alice@example.com", &SecretString::from(TEST_PASSWORD))
        .await
        .expect("registration should succeed");
    (backends, state, user)
}

// ============================================================================
// Issue and refresh
// ============================================================================

#[tokio::test]
async fn test_issue_stores_only_refresh_hash() -> Result<()> {
    let (backends, state, user) = setup().await;

    let pair = state.tokens.issue_token_pair(user.user_id).await?;
    assert_eq!(pair.token_type, "Bearer");
    assert_eq!(pair.expires_in, 900);

    let stored = backends.users.get(user.user_id).unwrap();
    let stored_hash = stored.refresh_token_hash.expect("refresh hash stored");
    assert_ne!(stored_hash, pair.refresh_token);
    assert_eq!(stored_hash, crypto::hash_token(&pair.refresh_token));

    assert_eq!(state.tokens.verify_access_token(&pair.access_token)?, user.user_id);
    Ok(())
}

#[tokio::test]
async fn test_refresh_rotates_and_supersedes_previous() -> Result<()> {
    let (_backends, state, user) = setup().await;

    let first = state.tokens.issue_token_pair(user.user_id).await?;
    let second = state.tokens.refresh(&first.refresh_token).await?;
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(state.tokens.verify_access_token(&second.access_token)?, user.user_id);

    let replay = state.tokens.refresh(&first.refresh_token).await;
    assert!(matches!(replay, Err(HubError::Unauthorized(_))));

    state.tokens.refresh(&second.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn test_new_login_supersedes_older_refresh_token() -> Result<()> {
    let (_backends, state, user) = setup().await;

    let laptop = state.tokens.issue_token_pair(user.user_id).await?;
    let phone = state.tokens.issue_token_pair(user.user_id).await?;

    let stale = state.tokens.refresh(&laptop.refresh_token).await;
    assert!(matches!(stale, Err(HubError::Unauthorized(_))));
    state.tokens.refresh(&phone.refresh_token).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_yields_single_winner() -> Result<()> {
    let (_backends, state, user) = setup().await;
    let pair = state.tokens.issue_token_pair(user.user_id).await?;
    let tokens = Arc::clone(&state.tokens);

    let attempts = (0..8).map(|_| {
        let tokens = Arc::clone(&tokens);
        let presented = pair.refresh_token.clone();
        tokio::spawn(async move { tokens.refresh(&presented).await })
    });

    let mut winners = 0;
    for outcome in futures::future::join_all(attempts).await {
        match outcome? {
            Ok(_) => winners += 1,
            Err(HubError::Unauthorized(_)) => {}
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn test_refresh_rejects_wrong_kinds_of_token() -> Result<()> {
    let (_backends, state, user) = setup().await;
    let pair = state.tokens.issue_token_pair(user.user_id).await?;

    let access_as_refresh = state.tokens.refresh(&pair.access_token).await;
    assert!(matches!(access_as_refresh, Err(HubError::Unauthorized(_))));

    let garbage = state.tokens.refresh("not-a-jwt").await;
    assert!(matches!(garbage, Err(HubError::Unauthorized(_))));

    let refresh_as_access = state.tokens.verify_access_token(&pair.refresh_token);
    assert!(matches!(refresh_as_access, Err(HubError::Unauthorized(_))));
    Ok(())
}

#[tokio::test]
async fn test_invalidate_revokes_refresh_but_not_access() -> Result<()> {
    let (backends, state, user) = setup().await;
    let pair = state.tokens.issue_token_pair(user.user_id).await?;

    state.tokens.invalidate(user.user_id).await?;
    assert!(backends.users.get(user.user_id).unwrap().refresh_token_hash.is_none());

    let refreshed = state.tokens.refresh(&pair.refresh_token).await;
    assert!(matches!(refreshed, Err(HubError::Unauthorized(_))));

    // Access tokens are stateless and stay valid until they expire.
    assert_eq!(state.tokens.verify_access_token(&pair.access_token)?, user.user_id);
    Ok(())
}

// ============================================================================
// Room tokens
// ============================================================================

#[tokio::test]
async fn test_room_token_carries_user_id() -> Result<()> {
    let (_backends, state, user) = setup().await;

    let token = state.tokens.create_room_access_token(user.user_id).await?;
    let claims: RoomClaims =
        crypto::verify_hs256(&token, &SecretString::from(TEST_ROOM_SECRET), 60)?;

    assert_eq!(claims.user_id, user.user_id.to_string());
    assert_eq!(claims.exp - claims.iat, 3600);

    // Room tokens are not session tokens.
    let as_access = state.tokens.verify_access_token(&token);
    assert!(matches!(as_access, Err(HubError::Unauthorized(_))));
    Ok(())
}

#[tokio::test]
async fn test_room_token_for_unknown_user() -> Result<()> {
    let (_backends, state, _user) = setup().await;
    let result = state
        .tokens
        .create_room_access_token(uuid::Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(HubError::NotFound(_))));
    Ok(())
}
