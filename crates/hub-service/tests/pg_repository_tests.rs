//! PostgreSQL repository tests.
//!
//! Each test gets a fresh database with migrations applied. Run with
//! `--features postgres-tests` and `DATABASE_URL` pointing at a server.

#![cfg(feature = "postgres-tests")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, Utc};
use hub_service::errors::HubError;
use hub_service::models::{Meeting, MeetingStatus, NewUser, OneTimeToken, ProfileUpdate, User};
use hub_service::repositories::{
    MeetingRepository, PgMeetingRepository, PgUserRepository, UserRepository,
};
use sqlx::PgPool;

fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.to_string(),
        email: format!("{}@example.com", name),
        password_hash: "$2b$10$placeholderplaceholderplaceholderplaceholderplace".to_string(),
        firstname: Some("user_".to_string()),
        lastname: Some(name.to_string()),
        avatar_url: None,
    }
}

async fn seeded_user(repo: &PgUserRepository, name: &str) -> User {
    repo.insert(new_user(name)).await.expect("insert user")
}

// ============================================================================
// Users
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_user_insert_and_unique_constraints(pool: PgPool) {
    let repo = PgUserRepository::new(pool);
    let alice = seeded_user(&repo, "alice").await;

    let found = repo.find_by_id(alice.user_id).await.unwrap().unwrap();
    assert_eq!(found.username, "alice");
    assert!(!found.is_email_verified);
    assert!(repo.find_by_email("alice@example.com").await.unwrap().is_some());
    assert!(repo.find_by_username("alice").await.unwrap().is_some());

    let dup_name = repo
        .insert(NewUser {
            email: "other@example.com".to_string(),
            ..new_user("alice")
        })
        .await;
    assert!(matches!(dup_name, Err(HubError::Conflict(_))));

    let dup_email = repo
        .insert(NewUser {
            email: "alice@example.com".to_string(),
            ..new_user("alice2")
        })
        .await;
    assert!(matches!(dup_email, Err(HubError::Conflict(_))));

    repo.ping().await.unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_refresh_token_compare_and_swap(pool: PgPool) {
    let repo = PgUserRepository::new(pool);
    let alice = seeded_user(&repo, "alice").await;

    repo.set_refresh_token(alice.user_id, Some("hash-1")).await.unwrap();

    assert!(repo
        .swap_refresh_token(alice.user_id, "hash-1", "hash-2")
        .await
        .unwrap());
    assert!(!repo
        .swap_refresh_token(alice.user_id, "hash-1", "hash-3")
        .await
        .unwrap());

    let stored = repo.find_by_id(alice.user_id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token_hash.as_deref(), Some("hash-2"));

    repo.set_refresh_token(alice.user_id, None).await.unwrap();
    assert!(!repo
        .swap_refresh_token(alice.user_id, "hash-2", "hash-4")
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_password_reset_is_single_use_and_expires(pool: PgPool) {
    let repo = PgUserRepository::new(pool);
    let alice = seeded_user(&repo, "alice").await;
    let now = Utc::now();

    repo.set_password_reset(
        alice.user_id,
        Some(OneTimeToken {
            token_hash: "reset-hash".to_string(),
            expires_at: now + Duration::minutes(10),
        }),
    )
    .await
    .unwrap();

    let expired = repo
        .consume_password_reset("reset-hash", "new-hash", now + Duration::minutes(11))
        .await
        .unwrap();
    assert_eq!(expired, None);

    let consumed = repo
        .consume_password_reset("reset-hash", "new-hash", now)
        .await
        .unwrap();
    assert_eq!(consumed, Some(alice.user_id));

    let stored = repo.find_by_id(alice.user_id).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, "new-hash");
    assert!(stored.password_reset.is_none());

    let again = repo
        .consume_password_reset("reset-hash", "other-hash", now)
        .await
        .unwrap();
    assert_eq!(again, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_email_verification_and_profile(pool: PgPool) {
    let repo = PgUserRepository::new(pool);
    let alice = seeded_user(&repo, "alice").await;
    let now = Utc::now();

    repo.set_email_verification(
        alice.user_id,
        Some(OneTimeToken {
            token_hash: "verify-hash".to_string(),
            expires_at: now + Duration::minutes(10),
        }),
    )
    .await
    .unwrap();

    let holder = repo
        .find_by_verification_token("verify-hash", now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(holder.user_id, alice.user_id);

    repo.mark_email_verified(alice.user_id).await.unwrap();
    let stored = repo.find_by_id(alice.user_id).await.unwrap().unwrap();
    assert!(stored.is_email_verified);
    assert!(stored.email_verification.is_none());

    let updated = repo
        .update_profile(
            alice.user_id,
            &ProfileUpdate {
                bio: Some("Hi".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.bio.as_deref(), Some("Hi"));
    assert_eq!(updated.lastname.as_deref(), Some("alice"));

    let with_avatar = repo
        .set_avatar(alice.user_id, "https://cdn.test/a.png", "avatars/a")
        .await
        .unwrap();
    assert_eq!(with_avatar.avatar_id.as_deref(), Some("avatars/a"));
}

// ============================================================================
// Meetings
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_meeting_round_trip_and_version_check(pool: PgPool) {
    let users = PgUserRepository::new(pool.clone());
    let meetings = PgMeetingRepository::new(pool);
    let alice = seeded_user(&users, "alice").await;
    let bob = seeded_user(&users, "bob").await;

    let now = Utc::now();
    let stored = meetings
        .insert(&Meeting::ongoing("m1".to_string(), alice.user_id, now))
        .await
        .unwrap();
    assert_eq!(stored.version, 0);

    let dup = meetings
        .insert(&Meeting::ongoing("m1".to_string(), bob.user_id, now))
        .await;
    assert!(matches!(dup, Err(HubError::Conflict(_))));

    let mut next = meetings.find("m1").await.unwrap().unwrap();
    next.members.push(hub_service::models::Member::joined(bob.user_id, now));
    assert!(meetings.save(&next, 0).await.unwrap());
    assert!(!meetings.save(&next, 0).await.unwrap(), "stale version must not save");

    let reloaded = meetings.find("m1").await.unwrap().unwrap();
    assert_eq!(reloaded.version, 1);
    assert_eq!(reloaded.members.len(), 2);
    assert_eq!(reloaded.status, MeetingStatus::Ongoing);

    let for_bob = meetings.list_for_member(bob.user_id).await.unwrap();
    assert_eq!(for_bob.len(), 1);
    assert!(meetings.list_with_recordings().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_many_and_personal_room(pool: PgPool) {
    let users = PgUserRepository::new(pool.clone());
    let meetings = PgMeetingRepository::new(pool);
    let alice = seeded_user(&users, "alice").await;
    let bob = seeded_user(&users, "bob").await;

    let found = users
        .find_many(&[alice.user_id, bob.user_id, uuid::Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    meetings
        .insert(&Meeting::ongoing("room".to_string(), alice.user_id, Utc::now()))
        .await
        .unwrap();
    let updated = users.set_personal_room(alice.user_id, "room").await.unwrap();
    assert_eq!(updated.personal_room_id.as_deref(), Some("room"));
}
