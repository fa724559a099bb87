//! Meeting handlers.
//!
//! All routes require an authenticated caller. Actions are taken as the
//! caller; a `userId` in the body is accepted only if it names the caller.
//!
//! Invitation emails are dispatched in the background. The handlers return
//! as soon as the meeting write is durable and do not wait for delivery.

use crate::errors::HubError;
use crate::handlers::{
    content_type, created, ensure_caller, ok, parse_json, parse_json_or_default, Enveloped,
};
use crate::middleware::AuthContext;
use crate::models::{
    AcceptInviteRequest, AddParticipantsRequest, CreateMeetingRequest, MeetingActionRequest,
    MeetingView, RecordingUploaded, RecordingsView, RoomTokenRequest, RoomTokenResponse,
    ScheduleMeetingRequest,
};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[instrument(skip_all, name = "hub.handlers.meetings.create")]
pub async fn create_meeting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<MeetingView>, HubError> {
    let request: CreateMeetingRequest = parse_json_or_default(&body)?;
    let meeting = state
        .meetings
        .create_meeting(auth.user_id, request.meeting_id)
        .await?;
    Ok(created("Meeting created successfully", meeting))
}

#[instrument(skip_all, name = "hub.handlers.meetings.schedule")]
pub async fn schedule_meeting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<MeetingView>, HubError> {
    let request: ScheduleMeetingRequest = parse_json(&body)?;
    let scheduled = state
        .meetings
        .schedule_meeting(
            auth.user_id,
            request.meeting_id,
            request.scheduled_time,
            &request.participants,
        )
        .await?;
    Ok(created("Meeting scheduled successfully", scheduled.meeting))
}

#[instrument(skip_all, name = "hub.handlers.meetings.room_token")]
pub async fn create_room_token(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<RoomTokenResponse>, HubError> {
    let request: RoomTokenRequest = parse_json_or_default(&body)?;
    ensure_caller(&auth, request.user_id)?;

    let token = state.tokens.create_room_access_token(auth.user_id).await?;
    Ok(ok("Token generated successfully", RoomTokenResponse { token }))
}

#[instrument(skip_all, name = "hub.handlers.meetings.join")]
pub async fn join_meeting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<MeetingView>, HubError> {
    let request: MeetingActionRequest = parse_json(&body)?;
    ensure_caller(&auth, request.user_id)?;

    let meeting = state
        .meetings
        .join_meeting(auth.user_id, &request.meeting_id)
        .await?;
    Ok(ok("Joined meeting successfully", meeting))
}

#[instrument(skip_all, name = "hub.handlers.meetings.leave")]
pub async fn leave_meeting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<MeetingView>, HubError> {
    let request: MeetingActionRequest = parse_json(&body)?;
    ensure_caller(&auth, request.user_id)?;

    let meeting = state
        .meetings
        .leave_meeting(auth.user_id, &request.meeting_id)
        .await?;
    Ok(ok("Left meeting successfully", meeting))
}

#[instrument(skip_all, name = "hub.handlers.meetings.end")]
pub async fn end_meeting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<MeetingView>, HubError> {
    let request: MeetingActionRequest = parse_json(&body)?;
    ensure_caller(&auth, request.user_id)?;

    let meeting = state
        .meetings
        .end_meeting(auth.user_id, &request.meeting_id)
        .await?;
    Ok(ok("Meeting ended successfully", meeting))
}

/// Only the caller's own meetings can be listed.
#[instrument(skip_all, name = "hub.handlers.meetings.list_for_user")]
pub async fn list_user_meetings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<Enveloped<Vec<MeetingView>>, HubError> {
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| HubError::Validation("Invalid user ID".to_string()))?;
    ensure_caller(&auth, Some(user_id))?;

    let meetings = state.meetings.list_user_meetings(user_id).await?;
    Ok(ok("Meetings fetched successfully", meetings))
}

#[instrument(skip_all, name = "hub.handlers.meetings.add_participants")]
pub async fn add_participants(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<MeetingView>, HubError> {
    let request: AddParticipantsRequest = parse_json(&body)?;
    let invited = state
        .meetings
        .add_participants(&request.meeting_id, &request.participants)
        .await?;
    Ok(ok(
        "Participants added and notified successfully",
        invited.meeting,
    ))
}

#[instrument(skip_all, name = "hub.handlers.meetings.accept_invite")]
pub async fn accept_invite(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<MeetingView>, HubError> {
    let request: AcceptInviteRequest = parse_json(&body)?;
    ensure_caller(&auth, request.user_id)?;

    let meeting = state
        .meetings
        .accept_invite(auth.user_id, &request.meeting_id, &request.email)
        .await?;
    Ok(ok(
        "Invitation accepted and joined meeting successfully",
        meeting,
    ))
}

/// Raw request body is the recording; `Content-Type` is passed through.
#[instrument(skip_all, name = "hub.handlers.meetings.upload_recording")]
pub async fn upload_recording(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthContext>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Enveloped<RecordingUploaded>, HubError> {
    let uploaded = state
        .meetings
        .add_recording(&meeting_id, body, &content_type(&headers))
        .await?;
    Ok(ok("Recording uploaded successfully", uploaded))
}

#[instrument(skip_all, name = "hub.handlers.meetings.recordings")]
pub async fn get_recordings(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthContext>,
    Path(meeting_id): Path<String>,
) -> Result<Enveloped<RecordingsView>, HubError> {
    let recordings = state.meetings.get_recordings(&meeting_id).await?;
    Ok(ok("Recordings fetched successfully", recordings))
}

#[instrument(skip_all, name = "hub.handlers.meetings.all_recordings")]
pub async fn list_all_recordings(
    State(state): State<Arc<AppState>>,
    Extension(_auth): Extension<AuthContext>,
) -> Result<Enveloped<Vec<RecordingsView>>, HubError> {
    let recordings = state.meetings.list_all_recordings().await?;
    Ok(ok("Recordings fetched successfully", recordings))
}
