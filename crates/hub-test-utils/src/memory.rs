//! In-memory repositories.
//!
//! Same contracts as the Postgres implementations: unique username/email,
//! version-checked meeting saves, compare-and-swap refresh rotation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_service::errors::HubError;
use hub_service::models::{Meeting, NewUser, OneTimeToken, ProfileUpdate, User};
use hub_service::repositories::{MeetingRepository, UserRepository};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use uuid::Uuid;

fn user_not_found() -> HubError {
    HubError::NotFound("User not found".to_string())
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored user, for assertions.
    pub fn get(&self, user_id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<T>(
        &self,
        user_id: Uuid,
        apply: impl FnOnce(&mut User) -> T,
    ) -> Result<T, HubError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&user_id).ok_or_else(user_not_found)?;
        let result = apply(user);
        user.updated_at = Utc::now();
        Ok(result)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, new_user: NewUser) -> Result<User, HubError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.username == new_user.username) {
            return Err(HubError::Conflict("Username is already taken".to_string()));
        }
        if users.values().any(|u| u.email == new_user.email) {
            return Err(HubError::Conflict("Email is already registered".to_string()));
        }

        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            refresh_token_hash: None,
            password_reset: None,
            email_verification: None,
            is_email_verified: false,
            personal_room_id: None,
            firstname: new_user.firstname,
            lastname: new_user.lastname,
            bio: None,
            dob: None,
            avatar_url: new_user.avatar_url,
            avatar_id: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, HubError> {
        Ok(self.get(user_id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, HubError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, HubError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_many(&self, user_ids: &[Uuid]) -> Result<Vec<User>, HubError> {
        let users = self.users.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect())
    }

    async fn set_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), HubError> {
        self.update(user_id, |u| {
            u.refresh_token_hash = token_hash.map(str::to_string);
        })
    }

    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, HubError> {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&user_id) {
            Some(user) if user.refresh_token_hash.as_deref() == Some(expected_hash) => {
                user.refresh_token_hash = Some(new_hash.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), HubError> {
        self.update(user_id, |u| u.password_hash = password_hash.to_string())
    }

    async fn set_password_reset(
        &self,
        user_id: Uuid,
        reset: Option<OneTimeToken>,
    ) -> Result<(), HubError> {
        self.update(user_id, |u| u.password_reset = reset)
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, HubError> {
        let mut users = self.users.lock().unwrap();
        let holder = users.values_mut().find(|u| {
            u.password_reset
                .as_ref()
                .is_some_and(|t| t.token_hash == token_hash && t.is_live(now))
        });

        Ok(holder.map(|user| {
            user.password_hash = new_password_hash.to_string();
            user.password_reset = None;
            user.updated_at = now;
            user.user_id
        }))
    }

    async fn set_email_verification(
        &self,
        user_id: Uuid,
        verification: Option<OneTimeToken>,
    ) -> Result<(), HubError> {
        self.update(user_id, |u| u.email_verification = verification)
    }

    async fn find_by_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, HubError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| {
                u.email_verification
                    .as_ref()
                    .is_some_and(|t| t.token_hash == token_hash && t.is_live(now))
            })
            .cloned())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), HubError> {
        self.update(user_id, |u| {
            u.is_email_verified = true;
            u.email_verification = None;
        })
    }

    async fn set_personal_room(&self, user_id: Uuid, meeting_id: &str) -> Result<User, HubError> {
        self.update(user_id, |u| {
            u.personal_room_id = Some(meeting_id.to_string());
        })?;
        self.get(user_id).ok_or_else(user_not_found)
    }

    async fn set_avatar(
        &self,
        user_id: Uuid,
        avatar_url: &str,
        avatar_id: &str,
    ) -> Result<User, HubError> {
        self.update(user_id, |u| {
            u.avatar_url = Some(avatar_url.to_string());
            u.avatar_id = Some(avatar_id.to_string());
        })?;
        self.get(user_id).ok_or_else(user_not_found)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<User, HubError> {
        self.update(user_id, |u| {
            if let Some(firstname) = &update.firstname {
                u.firstname = Some(firstname.clone());
            }
            if let Some(lastname) = &update.lastname {
                u.lastname = Some(lastname.clone());
            }
            if let Some(bio) = &update.bio {
                u.bio = Some(bio.clone());
            }
            if let Some(dob) = update.dob {
                u.dob = Some(dob);
            }
        })?;
        self.get(user_id).ok_or_else(user_not_found)
    }

    async fn ping(&self) -> Result<(), HubError> {
        Ok(())
    }
}

/// In-memory meeting store.
///
/// `interfere_with_next_saves(n)` makes the next `n` saves behave as if
/// another writer committed first: the stored version is bumped and the
/// save reports a conflict.
///
/// `hold_next_finds(n)` makes the next `n` finds wait for each other after
/// reading, so `n` concurrent writers all start from the same version.
#[derive(Default)]
pub struct MemoryMeetingRepository {
    meetings: Mutex<HashMap<String, Meeting>>,
    interfering_saves: AtomicUsize,
    save_attempts: AtomicUsize,
    find_gate: Mutex<Option<FindGate>>,
}

struct FindGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

impl MemoryMeetingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, meeting_id: &str) -> Option<Meeting> {
        self.meetings.lock().unwrap().get(meeting_id).cloned()
    }

    pub fn interfere_with_next_saves(&self, count: usize) {
        self.interfering_saves.store(count, Ordering::SeqCst);
    }

    pub fn hold_next_finds(&self, count: usize) {
        *self.find_gate.lock().unwrap() = Some(FindGate {
            barrier: Arc::new(Barrier::new(count)),
            remaining: count,
        });
    }

    fn take_find_gate(&self) -> Option<Arc<Barrier>> {
        let mut gate = self.find_gate.lock().unwrap();
        let current = gate.as_mut()?;
        current.remaining -= 1;
        let barrier = Arc::clone(&current.barrier);
        if current.remaining == 0 {
            *gate = None;
        }
        Some(barrier)
    }

    /// Number of `save` calls so far, including conflicted ones.
    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeetingRepository for MemoryMeetingRepository {
    async fn insert(&self, meeting: &Meeting) -> Result<Meeting, HubError> {
        let mut meetings = self.meetings.lock().unwrap();
        if meetings.contains_key(&meeting.meeting_id) {
            return Err(HubError::Conflict(
                "Meeting with this ID already exists".to_string(),
            ));
        }
        let mut stored = meeting.clone();
        stored.version = 0;
        meetings.insert(stored.meeting_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find(&self, meeting_id: &str) -> Result<Option<Meeting>, HubError> {
        let barrier = self.take_find_gate();
        let found = self.get(meeting_id);
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(found)
    }

    async fn save(&self, meeting: &Meeting, expected_version: i64) -> Result<bool, HubError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let mut meetings = self.meetings.lock().unwrap();
        let Some(stored) = meetings.get_mut(&meeting.meeting_id) else {
            return Ok(false);
        };

        let interfere = self
            .interfering_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if interfere {
            stored.version += 1;
            return Ok(false);
        }

        if stored.version != expected_version {
            return Ok(false);
        }

        let mut next = meeting.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(true)
    }

    async fn list_for_member(&self, user_id: Uuid) -> Result<Vec<Meeting>, HubError> {
        let meetings = self.meetings.lock().unwrap();
        let mut found: Vec<Meeting> = meetings
            .values()
            .filter(|m| m.member(user_id).is_some())
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_with_recordings(&self) -> Result<Vec<Meeting>, HubError> {
        let meetings = self.meetings.lock().unwrap();
        let mut found: Vec<Meeting> = meetings
            .values()
            .filter(|m| !m.recording_urls.is_empty())
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
