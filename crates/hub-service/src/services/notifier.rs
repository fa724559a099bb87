//! Outbound email delivery.
//!
//! The hub never talks SMTP itself. A `Notifier` hands a message to an email
//! relay (`HttpNotifier`) or, when no relay is configured, just logs that a
//! message would have been sent (`LogNotifier`).

use crate::models::Meeting;
use crate::observability::{hash_for_correlation, metrics};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{instrument, Instrument};

pub const INVITATION_SUBJECT: &str = "You're invited to a meeting";
pub const PASSWORD_RESET_SUBJECT: &str = "Reset your password";
pub const EMAIL_VERIFICATION_SUBJECT: &str = "Verify your email address";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Email relay unreachable: {0}")]
    Unreachable(String),

    #[error("Email relay rejected message with status {0}")]
    Rejected(u16),
}

/// Email delivery capability.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str)
        -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Notifier that POSTs `{to, subject, body}` JSON to an email relay.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    /// # Errors
    ///
    /// Returns `DeliveryError::Unreachable` if the HTTP client cannot be built.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DeliveryError::Unreachable(format!("client build failed: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait::async_trait]
impl Notifier for HttpNotifier {
    #[instrument(skip_all, name = "hub.notifier.send")]
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RelayMessage {
                to: recipient,
                subject,
                body,
            })
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Notifier used when no relay is configured. Logs recipient hash and
/// subject only; bodies can carry one-time tokens.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), DeliveryError> {
        tracing::info!(
            target: "hub.services.notifier",
            recipient = %hash_for_correlation(recipient),
            subject = %subject,
            "Email relay not configured, message not delivered"
        );
        Ok(())
    }
}

/// Subject and body of one outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Compose the invitation for `meeting`, sent identically to every invitee.
pub fn invitation_message(meeting: &Meeting, organizer: &str, frontend_url: &str) -> Message {
    let when = meeting
        .scheduled_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "not scheduled".to_string());
    let link = format!("{}/accept-invite/{}", frontend_url, meeting.meeting_id);

    Message {
        subject: INVITATION_SUBJECT.to_string(),
        body: format!(
            "{organizer} has invited you to a meeting.\n\n\
             Meeting ID: {id}\n\
             Organizer: {organizer}\n\
             Scheduled time: {when}\n\n\
             Accept the invitation: {link}\n",
            organizer = organizer,
            id = meeting.meeting_id,
            when = when,
            link = link,
        ),
    }
}

pub fn password_reset_message(frontend_url: &str, raw_token: &str) -> Message {
    let link = format!("{}/reset-password/{}", frontend_url, raw_token);
    Message {
        subject: PASSWORD_RESET_SUBJECT.to_string(),
        body: format!(
            "A password reset was requested for your account.\n\n\
             Reset your password: {link}\n\n\
             This link expires in 10 minutes. If you did not request it, ignore this email.\n"
        ),
    }
}

pub fn email_verification_message(frontend_url: &str, raw_token: &str) -> Message {
    let link = format!("{}/verify-email/{}", frontend_url, raw_token);
    Message {
        subject: EMAIL_VERIFICATION_SUBJECT.to_string(),
        body: format!(
            "Confirm your email address: {link}\n\nThis link expires in 10 minutes.\n"
        ),
    }
}

/// Outcome of one invitation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvitationReport {
    pub delivered: Vec<String>,
    /// `(recipient, reason)` for each failed send.
    pub failed: Vec<(String, String)>,
}

impl InvitationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Send `message` to every recipient on a detached task.
///
/// Sends run concurrently and independently; one failure never affects the
/// others. The caller may await the handle for the report or drop it.
pub fn dispatch_invitations(
    notifier: Arc<dyn Notifier>,
    meeting_id: String,
    recipients: Vec<String>,
    message: Message,
) -> JoinHandle<InvitationReport> {
    let span = tracing::info_span!("hub.notifier.dispatch_invitations", meeting_id = %meeting_id);

    tokio::spawn(
        async move {
            let sends = recipients.into_iter().map(|recipient| {
                let notifier = Arc::clone(&notifier);
                let message = &message;
                async move {
                    let result = notifier
                        .send(&recipient, &message.subject, &message.body)
                        .await;
                    (recipient, result)
                }
            });

            let mut report = InvitationReport::default();
            for (recipient, result) in join_all(sends).await {
                match result {
                    Ok(()) => {
                        metrics::record_invitation_delivery("delivered");
                        report.delivered.push(recipient);
                    }
                    Err(e) => {
                        metrics::record_invitation_delivery("failed");
                        tracing::warn!(
                            target: "hub.services.notifier",
                            recipient = %hash_for_correlation(&recipient),
                            error = %e,
                            "Invitation delivery failed"
                        );
                        report.failed.push((recipient, e.to_string()));
                    }
                }
            }

            tracing::info!(
                target: "hub.services.notifier",
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "Invitation batch finished"
            );
            report
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Fails for addresses containing "bounce".
    #[derive(Default)]
    struct PickyNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Notifier for PickyNotifier {
        async fn send(&self, recipient: &str, _: &str, _: &str) -> Result<(), DeliveryError> {
            if recipient.contains("bounce") {
                return Err(DeliveryError::Rejected(550));
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(recipient.to_string());
            }
            Ok(())
        }
    }

    fn scheduled_meeting() -> Meeting {
        let when = Utc.with_ymd_and_hms(2030, 5, 1, 15, 0, 0).single();
        let mut meeting = Meeting::ongoing("team-sync".to_string(), Uuid::new_v4(), Utc::now());
        meeting.scheduled_time = when;
        meeting
    }

    #[test]
    fn test_invitation_message_contents() {
        let message = invitation_message(&scheduled_meeting(), "alice", "https://app.example.com");

        assert_eq!(message.subject, INVITATION_SUBJECT);
        assert!(message.body.contains("team-sync"));
        assert!(message.body.contains("alice"));
        assert!(message.body.contains("2030-05-01T15:00:00+00:00"));
        assert!(message
            .body
            .contains("https://app.example.com/accept-invite/team-sync"));
    }

    #[test]
    fn test_invitation_message_without_schedule() {
        let mut meeting = scheduled_meeting();
        meeting.scheduled_time = None;
        let message = invitation_message(&meeting, "alice", "http://localhost:5173");
        assert!(message.body.contains("not scheduled"));
    }

    #[test]
    fn test_reset_and_verify_links() {
        let reset = password_reset_message("https://app.example.com", "abc123");
        assert!(reset.body.contains("https://app.example.com/reset-password/abc123"));

        let verify = email_verification_message("https://app.example.com", "def456");
        assert!(verify.body.contains("https://app.example.com/verify-email/def456"));
    }

    #[tokio::test]
    async fn test_dispatch_isolates_failures() {
        let notifier = Arc::new(PickyNotifier::default());
        let handle = dispatch_invitations(
            notifier.clone(),
            "team-sync".to_string(),
            vec![
                "a@x.com".to_string(),
                "bounce@x.com".to_string(),
                "b@x.com".to_string(),
            ],
            invitation_message(&scheduled_meeting(), "alice", "http://localhost"),
        );

        let report = handle.await.unwrap_or_default();
        assert_eq!(report.delivered, vec!["a@x.com", "b@x.com"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(
            report.failed.first().map(|(r, _)| r.as_str()),
            Some("bounce@x.com")
        );
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_dispatch_with_no_recipients() {
        let report = dispatch_invitations(
            Arc::new(LogNotifier),
            "m".to_string(),
            Vec::new(),
            invitation_message(&scheduled_meeting(), "alice", "http://localhost"),
        )
        .await
        .unwrap_or_default();
        assert!(report.delivered.is_empty());
        assert!(report.is_complete());
    }
}
