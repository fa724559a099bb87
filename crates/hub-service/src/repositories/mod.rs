//! Repository layer for Meeting Hub.
//!
//! Services talk to storage only through the `UserRepository` and
//! `MeetingRepository` traits. The Postgres implementations live in the
//! submodules; in-memory implementations with the same concurrency contracts
//! live in `hub-test-utils`.

pub mod meetings;
pub mod users;

pub use meetings::PgMeetingRepository;
pub use users::PgUserRepository;

use crate::errors::HubError;
use crate::models::{Meeting, NewUser, OneTimeToken, ProfileUpdate, User};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage for user aggregates.
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user.
    ///
    /// Returns `HubError::Conflict` if the username or email is taken.
    async fn insert(&self, new_user: NewUser) -> Result<User, HubError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, HubError>;

    /// Lookup by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, HubError>;

    /// Lookup by already-normalized username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, HubError>;

    /// Fetch several users at once. Missing ids are skipped.
    async fn find_many(&self, user_ids: &[Uuid]) -> Result<Vec<User>, HubError>;

    /// Overwrite (or clear) the stored refresh token hash.
    async fn set_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), HubError>;

    /// Replace the stored refresh token hash only if it still equals
    /// `expected_hash`. Returns `false` when another writer got there first.
    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, HubError>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), HubError>;

    async fn set_password_reset(
        &self,
        user_id: Uuid,
        reset: Option<OneTimeToken>,
    ) -> Result<(), HubError>;

    /// Atomically find the user holding a live reset token with this hash,
    /// set the new password hash and clear the reset fields.
    ///
    /// Returns the user id, or `None` if no live token matched.
    async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, HubError>;

    async fn set_email_verification(
        &self,
        user_id: Uuid,
        verification: Option<OneTimeToken>,
    ) -> Result<(), HubError>;

    /// Find the user holding a live email-verification token with this hash.
    async fn find_by_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, HubError>;

    /// Set `is_email_verified` and clear the verification fields.
    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), HubError>;

    async fn set_personal_room(&self, user_id: Uuid, meeting_id: &str) -> Result<User, HubError>;

    async fn set_avatar(
        &self,
        user_id: Uuid,
        avatar_url: &str,
        avatar_id: &str,
    ) -> Result<User, HubError>;

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate)
        -> Result<User, HubError>;

    /// Cheap round trip used by the readiness probe.
    async fn ping(&self) -> Result<(), HubError>;
}

/// Storage for meeting aggregates.
#[async_trait::async_trait]
pub trait MeetingRepository: Send + Sync {
    /// Insert a new meeting.
    ///
    /// Returns `HubError::Conflict` if the meeting id already exists.
    async fn insert(&self, meeting: &Meeting) -> Result<Meeting, HubError>;

    async fn find(&self, meeting_id: &str) -> Result<Option<Meeting>, HubError>;

    /// Persist `meeting` only if the stored version still equals
    /// `expected_version`, bumping the version by one.
    ///
    /// Returns `false` on a version conflict.
    async fn save(&self, meeting: &Meeting, expected_version: i64) -> Result<bool, HubError>;

    /// Meetings where `user_id` appears in `members`, newest first.
    async fn list_for_member(&self, user_id: Uuid) -> Result<Vec<Meeting>, HubError>;

    /// Meetings with at least one recording, newest first.
    async fn list_with_recordings(&self) -> Result<Vec<Meeting>, HubError>;
}
