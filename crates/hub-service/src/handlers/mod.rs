//! HTTP request handlers for Meeting Hub.
//!
//! Handlers deserialize JSON bodies themselves so malformed input is a 400
//! in the response envelope rather than Axum's default 422 plain-text
//! rejection.

pub mod health;
pub mod meetings;
pub mod users;

pub use health::{health_check, metrics_handler, readiness_check};
pub use meetings::{
    accept_invite, add_participants, create_meeting, create_room_token, end_meeting,
    get_recordings, join_meeting, leave_meeting, list_all_recordings, list_user_meetings,
    schedule_meeting, upload_recording,
};
pub use users::{
    change_password, edit_profile, forgot_password, get_current_user, login, logout,
    refresh_token, register, reset_password, send_verification_email, set_personal_room,
    update_avatar, verify_email,
};

use crate::errors::HubError;
use crate::middleware::AuthContext;
use axum::{
    body::Bytes,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use common::envelope::ApiEnvelope;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Success envelope with a payload.
pub type Enveloped<T> = (StatusCode, Json<ApiEnvelope<T>>);

pub(crate) fn ok<T>(message: &str, data: T) -> Enveloped<T> {
    (StatusCode::OK, Json(ApiEnvelope::ok(message, 200, data)))
}

pub(crate) fn created<T>(message: &str, data: T) -> Enveloped<T> {
    (StatusCode::CREATED, Json(ApiEnvelope::ok(message, 201, data)))
}

pub(crate) fn ok_message(message: &str) -> Enveloped<()> {
    (StatusCode::OK, Json(ApiEnvelope::message(message, 200)))
}

/// Deserialize a JSON body, mapping any failure to `Validation`.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, HubError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "hub.handlers", error = %e, "Invalid request body");
        HubError::Validation("Invalid request body".to_string())
    })
}

/// Like `parse_json`, but an empty body yields `T::default()`.
pub(crate) fn parse_json_or_default<T: DeserializeOwned + Default>(
    body: &Bytes,
) -> Result<T, HubError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}

/// A `userId` supplied alongside an authenticated request must name the caller.
pub(crate) fn ensure_caller(auth: &AuthContext, claimed: Option<Uuid>) -> Result<(), HubError> {
    match claimed {
        Some(user_id) if user_id != auth.user_id => {
            tracing::debug!(
                target: "hub.handlers",
                caller = %auth.user_id,
                "Rejected request acting on behalf of another user"
            );
            Err(HubError::Forbidden(
                "You can only act on your own behalf".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

pub(crate) fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string()
}
