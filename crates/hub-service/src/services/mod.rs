//! Business logic for Meeting Hub.
//!
//! # Components
//!
//! - `membership` / `invitations` - pure transitions on the meeting aggregate
//! - `meeting_service` - meeting lifecycle with version-checked writes
//! - `token_service` - access/refresh/room token issuance and rotation
//! - `credential_service` - registration, passwords, email verification, profile
//! - `notifier` / `blob_store` - external collaborators

pub mod blob_store;
pub mod credential_service;
pub mod invitations;
pub mod meeting_service;
pub mod membership;
pub mod notifier;
pub mod token_service;

pub use blob_store::{BlobStore, HttpBlobStore, UnconfiguredBlobStore};
pub use credential_service::CredentialService;
pub use meeting_service::{InvitedMeeting, MeetingService};
pub use notifier::{HttpNotifier, LogNotifier, Notifier};
pub use token_service::TokenService;
