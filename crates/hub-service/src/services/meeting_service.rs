//! Meeting lifecycle.
//!
//! Every mutation is a read-modify-write against the meeting row guarded by
//! its `version`: load, apply a pure transition, save with the version that
//! was read. A lost race reloads and retries; after `MAX_SAVE_ATTEMPTS` the
//! caller gets `Conflict`.

use crate::config::Config;
use crate::errors::HubError;
use crate::models::{
    is_valid_meeting_id, Meeting, MeetingStatus, MeetingView, MemberView, PublicUser,
    RecordingUploaded, RecordingsView, User, UserSummary, LIST_MEMBER_DISPLAY_LIMIT,
};
use crate::observability::metrics;
use crate::repositories::{MeetingRepository, UserRepository};
use crate::services::blob_store::{BlobStore, UploadMetadata, RECORDING_FOLDER};
use crate::services::invitations;
use crate::services::membership::{self, MEETING_ENDED_MESSAGE};
use crate::services::notifier::{self, InvitationReport, Notifier};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

/// Attempts at a version-checked save before giving up.
pub const MAX_SAVE_ATTEMPTS: usize = 5;

pub const CONCURRENT_MODIFICATION_MESSAGE: &str =
    "Meeting was modified concurrently, please retry";

/// A meeting plus the handle of the invitation batch it triggered.
///
/// The handle resolves to the per-recipient delivery report. Dropping it
/// does not cancel delivery.
pub struct InvitedMeeting {
    pub meeting: MeetingView,
    pub invitations: JoinHandle<InvitationReport>,
}

fn record<T>(operation: &str, result: &Result<T, HubError>) {
    let status = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    metrics::record_meeting_operation(operation, status);
}

fn resolve_meeting_id(meeting_id: Option<String>) -> Result<String, HubError> {
    match meeting_id.map(|id| id.trim().to_string()) {
        None => Ok(Uuid::new_v4().to_string()),
        Some(id) if id.is_empty() => Ok(Uuid::new_v4().to_string()),
        Some(id) if is_valid_meeting_id(&id) => Ok(id),
        Some(_) => Err(HubError::Validation(
            "Meeting ID must be 1-128 characters of letters, digits, '_' or '-'".to_string(),
        )),
    }
}

/// End transition: creator only, idempotent on an ended meeting, refused
/// for personal rooms.
fn end_transition(
    meeting: &mut Meeting,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, HubError> {
    if !meeting.is_creator(user_id) {
        return Err(HubError::Forbidden(
            "Only the meeting creator can end the meeting".to_string(),
        ));
    }
    match meeting.status {
        MeetingStatus::Ended => Ok(false),
        MeetingStatus::Personal => Err(HubError::Conflict(
            "A personal room cannot be ended".to_string(),
        )),
        MeetingStatus::Scheduled | MeetingStatus::Ongoing => {
            membership::close_all(meeting, now);
            meeting.status = MeetingStatus::Ended;
            meeting.ended_at = Some(now);
            meeting.ended_by = Some(meeting.created_by);
            Ok(true)
        }
    }
}

/// Promotion to a standing personal room: creator only.
fn promote_transition(meeting: &mut Meeting, user_id: Uuid) -> Result<bool, HubError> {
    if !meeting.is_creator(user_id) {
        return Err(HubError::Forbidden(
            "You cannot set another user's meeting as your personal room".to_string(),
        ));
    }
    match meeting.status {
        MeetingStatus::Ended => Err(HubError::Conflict(MEETING_ENDED_MESSAGE.to_string())),
        MeetingStatus::Personal => Ok(false),
        MeetingStatus::Scheduled | MeetingStatus::Ongoing => {
            meeting.status = MeetingStatus::Personal;
            Ok(true)
        }
    }
}

pub struct MeetingService {
    meetings: Arc<dyn MeetingRepository>,
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
    blob_store: Arc<dyn BlobStore>,
    frontend_url: String,
}

impl MeetingService {
    pub fn new(
        meetings: Arc<dyn MeetingRepository>,
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
        blob_store: Arc<dyn BlobStore>,
        config: &Config,
    ) -> Self {
        Self {
            meetings,
            users,
            notifier,
            blob_store,
            frontend_url: config.frontend_url.clone(),
        }
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, HubError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| HubError::NotFound("User not found".to_string()))
    }

    async fn require_meeting(&self, meeting_id: &str) -> Result<Meeting, HubError> {
        self.meetings
            .find(meeting_id)
            .await?
            .ok_or_else(|| HubError::NotFound("Meeting not found".to_string()))
    }

    /// Load, transform, version-checked save; retry on conflict.
    ///
    /// `transition` returns `Ok(false)` for a no-op, which skips the write.
    async fn mutate<F>(
        &self,
        meeting_id: &str,
        operation: &'static str,
        mut transition: F,
    ) -> Result<Meeting, HubError>
    where
        F: FnMut(&mut Meeting, DateTime<Utc>) -> Result<bool, HubError> + Send,
    {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let mut meeting = self.require_meeting(meeting_id).await?;
            let expected_version = meeting.version;
            let now = Utc::now();

            if !transition(&mut meeting, now)? {
                return Ok(meeting);
            }
            meeting.updated_at = now;

            if self.meetings.save(&meeting, expected_version).await? {
                meeting.version = expected_version + 1;
                return Ok(meeting);
            }

            metrics::record_optimistic_retry(operation);
            tracing::debug!(
                target: "hub.services.meetings",
                meeting_id = %meeting_id,
                operation = operation,
                attempt = attempt,
                "Version conflict, retrying"
            );
        }

        tracing::warn!(
            target: "hub.services.meetings",
            meeting_id = %meeting_id,
            operation = operation,
            "Giving up after repeated version conflicts"
        );
        Err(HubError::Conflict(CONCURRENT_MODIFICATION_MESSAGE.to_string()))
    }

    // ------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------

    /// Resolve creator and members to display projections.
    pub async fn project(&self, meeting: &Meeting) -> Result<MeetingView, HubError> {
        let mut views = self
            .project_many(std::slice::from_ref(meeting), None)
            .await?;
        views
            .pop()
            .ok_or_else(|| HubError::Internal("Projection produced no view".to_string()))
    }

    /// Project a batch with one user lookup. `member_limit` truncates each
    /// meeting's member list; `member_count` keeps the real size.
    async fn project_many(
        &self,
        meetings: &[Meeting],
        member_limit: Option<usize>,
    ) -> Result<Vec<MeetingView>, HubError> {
        let limit = member_limit.unwrap_or(usize::MAX);

        let mut ids: Vec<Uuid> = Vec::new();
        for meeting in meetings {
            ids.push(meeting.created_by);
            ids.extend(meeting.members.iter().take(limit).map(|m| m.user_id));
        }
        ids.sort_unstable();
        ids.dedup();

        let directory: HashMap<Uuid, UserSummary> = self
            .users
            .find_many(&ids)
            .await?
            .iter()
            .map(|u| (u.user_id, UserSummary::from(u)))
            .collect();

        Ok(meetings
            .iter()
            .map(|meeting| MeetingView {
                meeting_id: meeting.meeting_id.clone(),
                created_by: directory.get(&meeting.created_by).cloned(),
                created_by_id: meeting.created_by,
                members: meeting
                    .members
                    .iter()
                    .take(limit)
                    .map(|m| MemberView {
                        user_id: m.user_id,
                        user: directory.get(&m.user_id).cloned(),
                        joined_at: m.joined_at,
                        left_at: m.left_at,
                    })
                    .collect(),
                member_count: meeting.members.len(),
                invited_participants: meeting.invited_participants.clone(),
                scheduled_time: meeting.scheduled_time,
                status: meeting.status,
                ended_at: meeting.ended_at,
                ended_by: meeting.ended_by,
                recording_urls: meeting.recording_urls.clone(),
                created_at: meeting.created_at,
                updated_at: meeting.updated_at,
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    #[instrument(skip_all, name = "hub.services.meetings.create", fields(creator = %creator_id))]
    pub async fn create_meeting(
        &self,
        creator_id: Uuid,
        meeting_id: Option<String>,
    ) -> Result<MeetingView, HubError> {
        let result = async {
            let meeting_id = resolve_meeting_id(meeting_id)?;
            self.require_user(creator_id).await?;

            let meeting = self
                .meetings
                .insert(&Meeting::ongoing(meeting_id, creator_id, Utc::now()))
                .await?;

            tracing::info!(
                target: "hub.services.meetings",
                meeting_id = %meeting.meeting_id,
                "Meeting created"
            );
            self.project(&meeting).await
        }
        .await;

        record("create", &result);
        result
    }

    #[instrument(skip_all, name = "hub.services.meetings.schedule", fields(creator = %creator_id))]
    pub async fn schedule_meeting(
        &self,
        creator_id: Uuid,
        meeting_id: Option<String>,
        scheduled_time: Option<DateTime<Utc>>,
        participants: &[String],
    ) -> Result<InvitedMeeting, HubError> {
        let result = async {
            let meeting_id = resolve_meeting_id(meeting_id)?;
            let scheduled_time = scheduled_time
                .ok_or_else(|| HubError::Validation("scheduledTime is required".to_string()))?;
            let invitees = invitations::normalize_invitees(participants)?;
            let organizer = self.require_user(creator_id).await?;

            let meeting = self
                .meetings
                .insert(&Meeting::scheduled(
                    meeting_id,
                    creator_id,
                    scheduled_time,
                    invitees.clone(),
                    Utc::now(),
                ))
                .await?;

            tracing::info!(
                target: "hub.services.meetings",
                meeting_id = %meeting.meeting_id,
                invitees = invitees.len(),
                "Meeting scheduled"
            );

            let handle = self.notify_invitees(&meeting, &organizer.username, invitees);
            Ok(InvitedMeeting {
                meeting: self.project(&meeting).await?,
                invitations: handle,
            })
        }
        .await;

        record("schedule", &result);
        result
    }

    fn notify_invitees(
        &self,
        meeting: &Meeting,
        organizer: &str,
        recipients: Vec<String>,
    ) -> JoinHandle<InvitationReport> {
        let message = notifier::invitation_message(meeting, organizer, &self.frontend_url);
        notifier::dispatch_invitations(
            Arc::clone(&self.notifier),
            meeting.meeting_id.clone(),
            recipients,
            message,
        )
    }

    #[instrument(skip_all, name = "hub.services.meetings.join", fields(meeting_id = %meeting_id))]
    pub async fn join_meeting(
        &self,
        user_id: Uuid,
        meeting_id: &str,
    ) -> Result<MeetingView, HubError> {
        let result = async {
            self.require_user(user_id).await?;
            let meeting = self
                .mutate(meeting_id, "join", |m, now| {
                    membership::join(m, user_id, now).map(|o| o.changed())
                })
                .await?;
            self.project(&meeting).await
        }
        .await;

        record("join", &result);
        result
    }

    #[instrument(skip_all, name = "hub.services.meetings.leave", fields(meeting_id = %meeting_id))]
    pub async fn leave_meeting(
        &self,
        user_id: Uuid,
        meeting_id: &str,
    ) -> Result<MeetingView, HubError> {
        let result = async {
            let meeting = self
                .mutate(meeting_id, "leave", |m, now| {
                    membership::leave(m, user_id, now).map(|o| o.changed())
                })
                .await?;
            self.project(&meeting).await
        }
        .await;

        record("leave", &result);
        result
    }

    #[instrument(skip_all, name = "hub.services.meetings.end", fields(meeting_id = %meeting_id))]
    pub async fn end_meeting(
        &self,
        user_id: Uuid,
        meeting_id: &str,
    ) -> Result<MeetingView, HubError> {
        let result = async {
            let meeting = self
                .mutate(meeting_id, "end", |m, now| end_transition(m, user_id, now))
                .await?;
            tracing::info!(
                target: "hub.services.meetings",
                meeting_id = %meeting_id,
                "Meeting ended"
            );
            self.project(&meeting).await
        }
        .await;

        record("end", &result);
        result
    }

    /// Invite more emails. Only addresses not already invited are notified.
    #[instrument(skip_all, name = "hub.services.meetings.add_participants", fields(meeting_id = %meeting_id))]
    pub async fn add_participants(
        &self,
        meeting_id: &str,
        emails: &[String],
    ) -> Result<InvitedMeeting, HubError> {
        let result = async {
            if emails.is_empty() {
                return Err(HubError::Validation(
                    "participants must not be empty".to_string(),
                ));
            }
            let invitees = invitations::normalize_invitees(emails)?;

            let mut newly_added = Vec::new();
            let meeting = self
                .mutate(meeting_id, "add_participants", |m, _| {
                    newly_added = invitations::add(m, &invitees)?;
                    Ok(!newly_added.is_empty())
                })
                .await?;

            let organizer = self
                .users
                .find_by_id(meeting.created_by)
                .await?
                .map(|u| u.username)
                .unwrap_or_else(|| "A Meeting Hub user".to_string());

            let handle = self.notify_invitees(&meeting, &organizer, newly_added);
            Ok(InvitedMeeting {
                meeting: self.project(&meeting).await?,
                invitations: handle,
            })
        }
        .await;

        record("add_participants", &result);
        result
    }

    #[instrument(skip_all, name = "hub.services.meetings.accept_invite", fields(meeting_id = %meeting_id))]
    pub async fn accept_invite(
        &self,
        user_id: Uuid,
        meeting_id: &str,
        email: &str,
    ) -> Result<MeetingView, HubError> {
        let result = async {
            let email = crate::models::normalize_email(email);
            if email.is_empty() {
                return Err(HubError::Validation("Email is required".to_string()));
            }
            self.require_user(user_id).await?;

            let meeting = self
                .mutate(meeting_id, "accept_invite", |m, now| {
                    invitations::accept(m, &email, user_id, now).map(|()| true)
                })
                .await?;
            self.project(&meeting).await
        }
        .await;

        record("accept_invite", &result);
        result
    }

    /// Turn a meeting the caller created into their standing personal room.
    #[instrument(skip_all, name = "hub.services.meetings.promote_personal", fields(meeting_id = %meeting_id))]
    pub async fn promote_to_personal_room(
        &self,
        user_id: Uuid,
        meeting_id: &str,
    ) -> Result<PublicUser, HubError> {
        let result = async {
            self.require_user(user_id).await?;
            self.mutate(meeting_id, "promote_personal", |m, _| {
                promote_transition(m, user_id)
            })
            .await?;

            let user = self.users.set_personal_room(user_id, meeting_id).await?;
            Ok(PublicUser::from(&user))
        }
        .await;

        record("promote_personal", &result);
        result
    }

    #[instrument(skip_all, name = "hub.services.meetings.list_for_user")]
    pub async fn list_user_meetings(&self, user_id: Uuid) -> Result<Vec<MeetingView>, HubError> {
        let meetings = self.meetings.list_for_member(user_id).await?;
        self.project_many(&meetings, Some(LIST_MEMBER_DISPLAY_LIMIT))
            .await
    }

    /// The user's personal room, if set and still present.
    pub async fn personal_room(&self, user: &User) -> Result<Option<MeetingView>, HubError> {
        let Some(room_id) = user.personal_room_id.as_deref() else {
            return Ok(None);
        };
        match self.meetings.find(room_id).await? {
            Some(meeting) => Ok(Some(self.project(&meeting).await?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Recordings
    // ------------------------------------------------------------------

    /// Upload a recording and append its URL. A failed upload fails the call
    /// and leaves the meeting untouched.
    #[instrument(skip_all, name = "hub.services.meetings.add_recording", fields(meeting_id = %meeting_id))]
    pub async fn add_recording(
        &self,
        meeting_id: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<RecordingUploaded, HubError> {
        let result = async {
            if data.is_empty() {
                return Err(HubError::Validation(
                    "No recording file provided".to_string(),
                ));
            }
            self.require_meeting(meeting_id).await?;

            let stored = self
                .blob_store
                .upload(
                    data,
                    UploadMetadata {
                        folder: RECORDING_FOLDER.to_string(),
                        content_type: content_type.to_string(),
                    },
                )
                .await
                .map_err(|e| HubError::Collaborator(format!("Recording upload failed: {}", e)))?;

            let url = stored.url.clone();
            self.mutate(meeting_id, "add_recording", |m, _| {
                m.recording_urls.push(url.clone());
                Ok(true)
            })
            .await?;

            Ok(RecordingUploaded {
                meeting_id: meeting_id.to_string(),
                recording_url: stored.url,
            })
        }
        .await;

        record("add_recording", &result);
        result
    }

    pub async fn get_recordings(&self, meeting_id: &str) -> Result<RecordingsView, HubError> {
        let meeting = self.require_meeting(meeting_id).await?;
        if meeting.recording_urls.is_empty() {
            return Err(HubError::NotFound(
                "No recordings found for this meeting".to_string(),
            ));
        }
        Ok(RecordingsView {
            meeting_id: meeting.meeting_id,
            recording_urls: meeting.recording_urls,
        })
    }

    pub async fn list_all_recordings(&self) -> Result<Vec<RecordingsView>, HubError> {
        Ok(self
            .meetings
            .list_with_recordings()
            .await?
            .into_iter()
            .map(|m| RecordingsView {
                meeting_id: m.meeting_id,
                recording_urls: m.recording_urls,
            })
            .collect())
    }
}
