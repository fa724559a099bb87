//! Invitation bookkeeping on a meeting's `invited_participants` set.

use crate::errors::HubError;
use crate::models::{is_valid_email, normalize_email, Meeting, MeetingStatus, Member};
use crate::services::membership::MEETING_ENDED_MESSAGE;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Normalize and validate a batch of emails, dropping duplicates while
/// keeping first-seen order.
pub fn normalize_invitees(emails: &[String]) -> Result<Vec<String>, HubError> {
    let mut out: Vec<String> = Vec::with_capacity(emails.len());
    for raw in emails {
        let email = normalize_email(raw);
        if !is_valid_email(&email) {
            return Err(HubError::Validation(format!(
                "Invalid participant email: {}",
                raw.trim()
            )));
        }
        if !out.contains(&email) {
            out.push(email);
        }
    }
    Ok(out)
}

/// Add each email not already invited. Returns only the newly added ones,
/// which are the addresses that should be notified.
///
/// `emails` must already be normalized.
pub fn add(meeting: &mut Meeting, emails: &[String]) -> Result<Vec<String>, HubError> {
    if meeting.is_ended() {
        return Err(HubError::Conflict(MEETING_ENDED_MESSAGE.to_string()));
    }

    let mut added = Vec::new();
    for email in emails {
        if !meeting.invited_participants.contains(email) {
            meeting.invited_participants.push(email.clone());
            added.push(email.clone());
        }
    }
    Ok(added)
}

/// Consume the invitation for `email` and make `user_id` a member.
///
/// Membership is checked before the invitation, so a repeat accept is a
/// `Conflict` even though the email is already gone. Like a join, an
/// accepted invite starts a `scheduled` meeting.
pub fn accept(
    meeting: &mut Meeting,
    email: &str,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    if meeting.is_ended() {
        return Err(HubError::Conflict(MEETING_ENDED_MESSAGE.to_string()));
    }
    if meeting.member(user_id).is_some() {
        return Err(HubError::Conflict(
            "User is already a member of this meeting".to_string(),
        ));
    }

    let position = meeting
        .invited_participants
        .iter()
        .position(|invited| invited == email)
        .ok_or_else(|| {
            HubError::Forbidden("This email was not invited to the meeting".to_string())
        })?;

    meeting.invited_participants.remove(position);
    meeting.members.push(Member::joined(user_id, now));
    if meeting.status == MeetingStatus::Scheduled {
        meeting.status = MeetingStatus::Ongoing;
    }
    Ok(())
}
