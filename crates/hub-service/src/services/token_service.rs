//! Access / refresh token issuance and rotation.
//!
//! Each user has at most one honored refresh token: the SHA-256 of the last
//! one issued. Rotation is a compare-and-swap on that hash, so two refreshes
//! racing with the same token produce exactly one new pair.

use crate::config::Config;
use crate::crypto::{self, RoomClaims, SessionClaims, TokenKind};
use crate::errors::HubError;
use crate::models::TokenPair;
use crate::observability::metrics;
use crate::repositories::UserRepository;
use common::secret::SecretString;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

const INVALID_REFRESH_MESSAGE: &str = "Invalid or expired refresh token";

pub struct TokenService {
    users: Arc<dyn UserRepository>,
    access_secret: SecretString,
    refresh_secret: SecretString,
    room_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    room_ttl_seconds: i64,
    clock_skew_seconds: i64,
}

impl TokenService {
    pub fn new(users: Arc<dyn UserRepository>, config: &Config) -> Self {
        Self {
            users,
            access_secret: config.access_token_secret.clone(),
            refresh_secret: config.refresh_token_secret.clone(),
            room_secret: config.room_token_secret.clone(),
            access_ttl_seconds: config.access_token_ttl_seconds,
            refresh_ttl_seconds: config.refresh_token_ttl_seconds,
            room_ttl_seconds: config.room_token_ttl_seconds,
            clock_skew_seconds: config.jwt_clock_skew_seconds,
        }
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    fn mint_pair(&self, user_id: Uuid) -> Result<TokenPair, HubError> {
        let now = chrono::Utc::now().timestamp();
        let sub = user_id.to_string();

        let access = SessionClaims {
            sub: sub.clone(),
            kind: TokenKind::Access,
            iat: now,
            exp: now + self.access_ttl_seconds,
            jti: Uuid::new_v4().to_string(),
        };
        let refresh = SessionClaims {
            sub,
            kind: TokenKind::Refresh,
            iat: now,
            exp: now + self.refresh_ttl_seconds,
            jti: Uuid::new_v4().to_string(),
        };

        Ok(TokenPair {
            access_token: crypto::sign_hs256(&access, &self.access_secret)?,
            refresh_token: crypto::sign_hs256(&refresh, &self.refresh_secret)?,
            token_type: "Bearer".to_string(),
            expires_in: u64::try_from(self.access_ttl_seconds).unwrap_or_default(),
        })
    }

    /// Issue a fresh pair and make its refresh token the only honored one.
    #[instrument(skip_all, name = "hub.services.tokens.issue_pair")]
    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, HubError> {
        let pair = self.mint_pair(user_id)?;
        self.users
            .set_refresh_token(user_id, Some(&crypto::hash_token(&pair.refresh_token)))
            .await?;

        metrics::record_token_operation("issue", "success");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Fails `Unauthorized` if the token does not verify, is not the one
    /// currently stored, or lost a concurrent rotation.
    #[instrument(skip_all, name = "hub.services.tokens.refresh")]
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, HubError> {
        let result = self.rotate(presented).await;
        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_token_operation("refresh", status);
        result
    }

    async fn rotate(&self, presented: &str) -> Result<TokenPair, HubError> {
        let unauthorized = || HubError::Unauthorized(INVALID_REFRESH_MESSAGE.to_string());

        let claims: SessionClaims =
            crypto::verify_hs256(presented, &self.refresh_secret, self.clock_skew_seconds)
                .map_err(|_| unauthorized())?;
        if claims.kind != TokenKind::Refresh {
            return Err(unauthorized());
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| unauthorized())?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(unauthorized)?;

        let presented_hash = crypto::hash_token(presented);
        if user.refresh_token_hash.as_deref() != Some(presented_hash.as_str()) {
            tracing::info!(
                target: "hub.services.tokens",
                user_id = %user_id,
                "Refresh rejected: token superseded or revoked"
            );
            return Err(unauthorized());
        }

        let pair = self.mint_pair(user_id)?;
        let swapped = self
            .users
            .swap_refresh_token(
                user_id,
                &presented_hash,
                &crypto::hash_token(&pair.refresh_token),
            )
            .await?;

        if !swapped {
            tracing::info!(
                target: "hub.services.tokens",
                user_id = %user_id,
                "Refresh rejected: lost concurrent rotation"
            );
            return Err(unauthorized());
        }

        Ok(pair)
    }

    /// Drop the stored refresh token (logout).
    #[instrument(skip_all, name = "hub.services.tokens.invalidate")]
    pub async fn invalidate(&self, user_id: Uuid) -> Result<(), HubError> {
        self.users.set_refresh_token(user_id, None).await?;
        metrics::record_token_operation("invalidate", "success");
        Ok(())
    }

    /// Resolve the user id from an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid, HubError> {
        let unauthorized = || HubError::Unauthorized("Invalid or expired access token".to_string());

        let claims: SessionClaims =
            crypto::verify_hs256(token, &self.access_secret, self.clock_skew_seconds)
                .map_err(|_| unauthorized())?;
        if claims.kind != TokenKind::Access {
            return Err(unauthorized());
        }
        Uuid::parse_str(&claims.sub).map_err(|_| unauthorized())
    }

    /// Token for the external conferencing transport.
    #[instrument(skip_all, name = "hub.services.tokens.room_token")]
    pub async fn create_room_access_token(&self, user_id: Uuid) -> Result<String, HubError> {
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(HubError::NotFound("User not found".to_string()));
        }

        let now = chrono::Utc::now().timestamp();
        let claims = RoomClaims {
            user_id: user_id.to_string(),
            iat: now,
            exp: now + self.room_ttl_seconds,
            jti: Uuid::new_v4().to_string(),
        };
        let token = crypto::sign_hs256(&claims, &self.room_secret)?;

        metrics::record_token_operation("room", "success");
        Ok(token)
    }
}
