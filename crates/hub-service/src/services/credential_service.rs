//! User identity: registration, password checks, reset and email
//! verification flows, and profile edits.
//!
//! Only bcrypt hashes of passwords and SHA-256 hashes of one-time tokens are
//! persisted. Raw one-time tokens leave this module only inside the email
//! that carries them.

use crate::config::Config;
use crate::crypto;
use crate::errors::HubError;
use crate::models::{
    is_valid_email, is_valid_username, normalize_email, NewUser, OneTimeToken, ProfileUpdate,
    User, MIN_PASSWORD_LENGTH,
};
use crate::observability::hash_for_correlation;
use crate::repositories::UserRepository;
use crate::services::blob_store::{BlobStore, UploadMetadata, AVATAR_FOLDER};
use crate::services::notifier::{self, Notifier};
use bytes::Bytes;
use chrono::{Duration, Utc};
use common::secret::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Lifetime of reset and verification tokens.
pub const ONE_TIME_TOKEN_TTL_MINUTES: i64 = 10;

/// Default first name given at registration.
const DEFAULT_FIRSTNAME: &str = "user_";

fn validate_password(password: &SecretString) -> Result<(), HubError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(HubError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub struct CredentialService {
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
    blob_store: Arc<dyn BlobStore>,
    bcrypt_cost: u32,
    frontend_url: String,
    default_avatar_url: Option<String>,
}

impl CredentialService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
        blob_store: Arc<dyn BlobStore>,
        config: &Config,
    ) -> Self {
        Self {
            users,
            notifier,
            blob_store,
            bcrypt_cost: config.bcrypt_cost,
            frontend_url: config.frontend_url.clone(),
            default_avatar_url: config.default_avatar_url.clone(),
        }
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, HubError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| HubError::NotFound("User not found".to_string()))
    }

    /// Create an account. Username and email are lowercased; both must be
    /// unused.
    #[instrument(skip_all, name = "hub.services.credentials.register")]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<User, HubError> {
        let username = username.trim().to_lowercase();
        let email = normalize_email(email);

        if !is_valid_username(&username) {
            return Err(HubError::Validation(
                "Username must be 3-32 characters of a-z, 0-9, '_', '.', '-'".to_string(),
            ));
        }
        if !is_valid_email(&email) {
            return Err(HubError::Validation("Invalid email format".to_string()));
        }
        validate_password(password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(HubError::Conflict("Email is already registered".to_string()));
        }
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(HubError::Conflict("Username is already taken".to_string()));
        }

        let password_hash = crypto::hash_password(password.expose_secret(), self.bcrypt_cost)?;

        // Insert still maps unique violations to Conflict if a concurrent
        // registration slipped between the checks above and here.
        let user = self
            .users
            .insert(NewUser {
                lastname: Some(username.clone()),
                username,
                email,
                password_hash,
                firstname: Some(DEFAULT_FIRSTNAME.to_string()),
                avatar_url: self.default_avatar_url.clone(),
            })
            .await?;

        tracing::info!(
            target: "hub.services.credentials",
            user_id = %user.user_id,
            "User registered"
        );
        Ok(user)
    }

    /// Resolve a user by username or email and check the password.
    ///
    /// `NotFound` when no account matches, `Unauthorized` on a wrong password.
    #[instrument(skip_all, name = "hub.services.credentials.authenticate")]
    pub async fn authenticate(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: &SecretString,
    ) -> Result<User, HubError> {
        let user = match (
            username.map(str::trim).filter(|u| !u.is_empty()),
            email.map(str::trim).filter(|e| !e.is_empty()),
        ) {
            (Some(username), _) => {
                self.users
                    .find_by_username(&username.to_lowercase())
                    .await?
            }
            (None, Some(email)) => self.users.find_by_email(&normalize_email(email)).await?,
            (None, None) => {
                return Err(HubError::Validation(
                    "Username or email is required".to_string(),
                ))
            }
        }
        .ok_or_else(|| HubError::NotFound("User not found".to_string()))?;

        if !self.verify_password(&user, password)? {
            tracing::info!(
                target: "hub.services.credentials",
                user_id = %user.user_id,
                "Login rejected: bad password"
            );
            return Err(HubError::Unauthorized("Invalid credentials".to_string()));
        }

        Ok(user)
    }

    pub fn verify_password(&self, user: &User, candidate: &SecretString) -> Result<bool, HubError> {
        crypto::verify_password(candidate.expose_secret(), &user.password_hash)
    }

    #[instrument(skip_all, name = "hub.services.credentials.change_password")]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), HubError> {
        let user = self.require_user(user_id).await?;
        if !self.verify_password(&user, current)? {
            return Err(HubError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password(new_password)?;

        let hash = crypto::hash_password(new_password.expose_secret(), self.bcrypt_cost)?;
        self.users.set_password_hash(user_id, &hash).await
    }

    /// Store a fresh reset token for the account behind `email` and return
    /// the raw value.
    #[instrument(skip_all, name = "hub.services.credentials.begin_password_reset")]
    pub async fn begin_password_reset(&self, email: &str) -> Result<SecretString, HubError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(HubError::Validation("Email is required".to_string()));
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| HubError::NotFound("User not found".to_string()))?;

        let raw = crypto::generate_one_time_token()?;
        self.users
            .set_password_reset(
                user.user_id,
                Some(OneTimeToken {
                    token_hash: crypto::hash_token(raw.expose_secret()),
                    expires_at: Utc::now() + Duration::minutes(ONE_TIME_TOKEN_TTL_MINUTES),
                }),
            )
            .await?;

        Ok(raw)
    }

    /// Begin a reset and email the link. Delivery failure fails the call.
    #[instrument(skip_all, name = "hub.services.credentials.forgot_password")]
    pub async fn send_password_reset(&self, email: &str) -> Result<(), HubError> {
        let raw = self.begin_password_reset(email).await?;
        let message = notifier::password_reset_message(&self.frontend_url, raw.expose_secret());
        let recipient = normalize_email(email);

        self.notifier
            .send(&recipient, &message.subject, &message.body)
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "hub.services.credentials",
                    recipient = %hash_for_correlation(&recipient),
                    error = %e,
                    "Password reset email failed"
                );
                HubError::Collaborator(format!("Password reset email failed: {}", e))
            })
    }

    /// `NotFound` unless some user holds a live token with this hash.
    #[instrument(skip_all, name = "hub.services.credentials.complete_password_reset")]
    pub async fn complete_password_reset(
        &self,
        raw_token: &str,
        new_password: &SecretString,
    ) -> Result<Uuid, HubError> {
        validate_password(new_password)?;
        let hash = crypto::hash_password(new_password.expose_secret(), self.bcrypt_cost)?;

        self.users
            .consume_password_reset(&crypto::hash_token(raw_token), &hash, Utc::now())
            .await?
            .ok_or_else(|| HubError::NotFound("Invalid or expired reset token".to_string()))
    }

    #[instrument(skip_all, name = "hub.services.credentials.begin_email_verification")]
    pub async fn begin_email_verification(&self, user_id: Uuid) -> Result<SecretString, HubError> {
        let user = self.require_user(user_id).await?;
        if user.is_email_verified {
            return Err(HubError::Conflict("Email is already verified".to_string()));
        }

        let raw = crypto::generate_one_time_token()?;
        self.users
            .set_email_verification(
                user_id,
                Some(OneTimeToken {
                    token_hash: crypto::hash_token(raw.expose_secret()),
                    expires_at: Utc::now() + Duration::minutes(ONE_TIME_TOKEN_TTL_MINUTES),
                }),
            )
            .await?;

        Ok(raw)
    }

    /// Begin verification and email the link. Delivery failure fails the call.
    #[instrument(skip_all, name = "hub.services.credentials.send_verification")]
    pub async fn send_email_verification(&self, user_id: Uuid) -> Result<(), HubError> {
        let raw = self.begin_email_verification(user_id).await?;
        let user = self.require_user(user_id).await?;
        let message =
            notifier::email_verification_message(&self.frontend_url, raw.expose_secret());

        self.notifier
            .send(&user.email, &message.subject, &message.body)
            .await
            .map_err(|e| {
                HubError::Collaborator(format!("Verification email failed: {}", e))
            })
    }

    #[instrument(skip_all, name = "hub.services.credentials.complete_email_verification")]
    pub async fn complete_email_verification(&self, raw_token: &str) -> Result<Uuid, HubError> {
        let user = self
            .users
            .find_by_verification_token(&crypto::hash_token(raw_token), Utc::now())
            .await?
            .ok_or_else(|| HubError::NotFound("Invalid or expired verification token".to_string()))?;

        if user.is_email_verified {
            return Err(HubError::Conflict("Email is already verified".to_string()));
        }

        self.users.mark_email_verified(user.user_id).await?;
        Ok(user.user_id)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, HubError> {
        self.require_user(user_id).await
    }

    /// Upload a new avatar, then best-effort delete the previous blob.
    #[instrument(skip_all, name = "hub.services.credentials.update_avatar")]
    pub async fn update_avatar(
        &self,
        user_id: Uuid,
        data: Bytes,
        content_type: &str,
    ) -> Result<User, HubError> {
        if data.is_empty() {
            return Err(HubError::Validation("No file uploaded".to_string()));
        }
        let previous = self.require_user(user_id).await?;

        let stored = self
            .blob_store
            .upload(
                data,
                UploadMetadata {
                    folder: AVATAR_FOLDER.to_string(),
                    content_type: content_type.to_string(),
                },
            )
            .await
            .map_err(|e| HubError::Collaborator(format!("Avatar upload failed: {}", e)))?;

        let user = self
            .users
            .set_avatar(user_id, &stored.url, &stored.id)
            .await?;

        if let Some(old_id) = previous.avatar_id.filter(|id| *id != stored.id) {
            if let Err(e) = self.blob_store.delete(&old_id).await {
                tracing::warn!(
                    target: "hub.services.credentials",
                    error = %e,
                    "Failed to delete previous avatar"
                );
            }
        }

        Ok(user)
    }

    #[instrument(skip_all, name = "hub.services.credentials.edit_profile")]
    pub async fn edit_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<User, HubError> {
        self.users.update_profile(user_id, update).await
    }
}
