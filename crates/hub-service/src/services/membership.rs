//! Membership transitions on a meeting's `members` list.
//!
//! Pure functions: they mutate an in-memory `Meeting` and report what
//! changed, so callers can skip the write on a no-op.

use crate::errors::HubError;
use crate::models::{Meeting, MeetingStatus, Member};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const MEETING_ENDED_MESSAGE: &str = "Meeting has ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// New member appended.
    Joined,
    /// Existing member's `left_at` cleared.
    Rejoined,
    /// Already present; nothing changed.
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    /// Not a member, or already left.
    NotPresent,
}

impl JoinOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, JoinOutcome::AlreadyPresent)
    }
}

impl LeaveOutcome {
    pub fn changed(self) -> bool {
        matches!(self, LeaveOutcome::Left)
    }
}

/// Add `user_id` to the meeting, or bring a departed member back.
///
/// The first join on a `scheduled` meeting starts it.
pub fn join(
    meeting: &mut Meeting,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<JoinOutcome, HubError> {
    if meeting.is_ended() {
        return Err(HubError::Conflict(MEETING_ENDED_MESSAGE.to_string()));
    }

    let outcome = match meeting.members.iter_mut().find(|m| m.user_id == user_id) {
        Some(member) if member.is_present() => JoinOutcome::AlreadyPresent,
        Some(member) => {
            member.left_at = None;
            JoinOutcome::Rejoined
        }
        None => {
            meeting.members.push(Member::joined(user_id, now));
            JoinOutcome::Joined
        }
    };

    if outcome.changed() && meeting.status == MeetingStatus::Scheduled {
        meeting.status = MeetingStatus::Ongoing;
    }

    Ok(outcome)
}

/// Mark `user_id` as having left. The creator can never leave.
pub fn leave(
    meeting: &mut Meeting,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<LeaveOutcome, HubError> {
    if meeting.is_creator(user_id) {
        return Err(HubError::Forbidden(
            "Meeting creator cannot leave the meeting".to_string(),
        ));
    }
    if meeting.is_ended() {
        return Err(HubError::Conflict(MEETING_ENDED_MESSAGE.to_string()));
    }

    match meeting.members.iter_mut().find(|m| m.user_id == user_id) {
        Some(member) if member.is_present() => {
            member.left_at = Some(now);
            Ok(LeaveOutcome::Left)
        }
        _ => Ok(LeaveOutcome::NotPresent),
    }
}

/// Stamp `left_at = now` on every member still present. Returns how many
/// members were closed out.
pub fn close_all(meeting: &mut Meeting, now: DateTime<Utc>) -> usize {
    let mut closed = 0;
    for member in meeting.members.iter_mut().filter(|m| m.is_present()) {
        member.left_at = Some(now);
        closed += 1;
    }
    closed
}
