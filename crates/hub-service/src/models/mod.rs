//! Domain aggregates, read-side projections and request/response types.
//!
//! Wire types use camelCase field names to match the web client.

use chrono::{DateTime, NaiveDate, Utc};
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 32;
pub const MAX_MEETING_ID_LENGTH: usize = 128;

/// Member resolution cap used by `listUserMeetings`.
pub const LIST_MEMBER_DISPLAY_LIMIT: usize = 5;

// ============================================================================
// Meeting aggregate
// ============================================================================

/// Meeting status.
///
/// `scheduled -> ongoing | personal | ended`, `ongoing -> ended`. Nothing
/// leaves `ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Ongoing,
    Ended,
    Personal,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::Ongoing => "ongoing",
            MeetingStatus::Ended => "ended",
            MeetingStatus::Personal => "personal",
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MeetingStatus::Scheduled),
            "ongoing" => Ok(MeetingStatus::Ongoing),
            "ended" => Ok(MeetingStatus::Ended),
            "personal" => Ok(MeetingStatus::Personal),
            other => Err(format!("Unknown meeting status: {}", other)),
        }
    }
}

/// One user's presence record on a meeting.
///
/// `left_at == None` means the user is currently in the meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn joined(user_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            joined_at: at,
            left_at: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Meeting aggregate. `version` is the optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq)]
pub struct Meeting {
    pub meeting_id: String,
    pub created_by: Uuid,
    pub members: Vec<Member>,
    pub invited_participants: Vec<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub status: MeetingStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_by: Option<Uuid>,
    pub recording_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Meeting {
    /// New `ongoing` meeting with the creator as its only member.
    pub fn ongoing(meeting_id: String, created_by: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            meeting_id,
            created_by,
            members: vec![Member::joined(created_by, now)],
            invited_participants: Vec::new(),
            scheduled_time: Some(now),
            status: MeetingStatus::Ongoing,
            ended_at: None,
            ended_by: None,
            recording_urls: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// New `scheduled` meeting carrying its initial invitation list.
    pub fn scheduled(
        meeting_id: String,
        created_by: Uuid,
        scheduled_time: DateTime<Utc>,
        invited_participants: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            scheduled_time: Some(scheduled_time),
            status: MeetingStatus::Scheduled,
            invited_participants,
            ..Self::ongoing(meeting_id, created_by, now)
        }
    }

    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.created_by == user_id
    }

    pub fn member(&self, user_id: Uuid) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn is_ended(&self) -> bool {
        self.status == MeetingStatus::Ended
    }
}

// ============================================================================
// User aggregate
// ============================================================================

/// Hash of a one-time token and its expiry. Both are stored or neither is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeToken {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    /// SHA-256 hex of the single currently honored refresh token.
    pub refresh_token_hash: Option<String>,
    pub password_reset: Option<OneTimeToken>,
    pub email_verification: Option<OneTimeToken>,
    pub is_email_verified: bool,
    pub personal_room_id: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub bio: Option<String>,
    pub dob: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    pub avatar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub avatar_url: Option<String>,
}

/// Profile fields a user may edit. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub bio: Option<String>,
    pub dob: Option<NaiveDate>,
}

// ============================================================================
// Read-side projections
// ============================================================================

/// Minimal display projection of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// A user with every credential field stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub is_email_verified: bool,
    pub personal_room_id: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub bio: Option<String>,
    pub dob: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_email_verified: user.is_email_verified,
            personal_room_id: user.personal_room_id.clone(),
            firstname: user.firstname.clone(),
            lastname: user.lastname.clone(),
            bio: user.bio.clone(),
            dob: user.dob,
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: Uuid,
    /// `None` when the referenced user could not be resolved.
    pub user: Option<UserSummary>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingView {
    pub meeting_id: String,
    pub created_by: Option<UserSummary>,
    pub created_by_id: Uuid,
    /// Possibly truncated in list views; see `member_count`.
    pub members: Vec<MemberView>,
    pub member_count: usize,
    pub invited_participants: Vec<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub status: MeetingStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_by: Option<Uuid>,
    pub recording_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `GET /users/me` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserView {
    #[serde(flatten)]
    pub user: PublicUser,
    pub personal_room: Option<MeetingView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingsView {
    pub meeting_id: String,
    pub recording_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingUploaded {
    pub meeting_id: String,
    pub recording_url: String,
}

// ============================================================================
// Tokens
// ============================================================================

/// Access/refresh token pair handed to a client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTokenResponse {
    pub token: String,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub meeting_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMeetingRequest {
    pub meeting_id: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<String>,
}

/// Body for join / leave / end. `user_id`, when present, must match the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingActionRequest {
    pub meeting_id: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantsRequest {
    pub meeting_id: String,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteRequest {
    pub meeting_id: String,
    pub email: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalRoomRequest {
    pub meeting_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTokenRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

/// Login by username or email.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: SecretString,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: SecretString,
    pub new_password: SecretString,
}

// ============================================================================
// Input normalization / validation
// ============================================================================

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email shape check: `local@domain.tld`.
pub fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let (local, domain) = match (parts.first(), parts.get(1)) {
        (Some(l), Some(d)) => (*l, *d),
        _ => return false,
    };

    if local.is_empty() || local.contains(char::is_whitespace) {
        return false;
    }

    let domain_parts: Vec<&str> = domain.split('.').collect();
    if domain_parts.len() < 2 {
        return false;
    }

    domain_parts.iter().all(|p| !p.is_empty())
}

/// Username rule: 3-32 chars of `[a-z0-9_.-]` (input is lowercased first).
pub fn is_valid_username(username: &str) -> bool {
    (MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
}

/// Meeting id rule: 1-128 chars of `[A-Za-z0-9_-]`. Generated UUIDs qualify.
pub fn is_valid_meeting_id(meeting_id: &str) -> bool {
    !meeting_id.is_empty()
        && meeting_id.len() <= MAX_MEETING_ID_LENGTH
        && meeting_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}
