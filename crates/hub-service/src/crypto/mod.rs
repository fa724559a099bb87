//! Password hashing, one-time tokens and HS256 JWTs.

#[cfg(test)]
use crate::config::{DEFAULT_BCRYPT_COST, DEFAULT_JWT_CLOCK_SKEW_SECONDS};
use crate::config::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::errors::HubError;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::instrument;

/// Maximum accepted JWT size in bytes.
///
/// Checked before any base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 4096;

/// Raw one-time token length in bytes (hex encoded to 64 chars).
const ONE_TIME_TOKEN_BYTES: usize = 32;

const INVALID_TOKEN_MESSAGE: &str = "The token is invalid or expired";

/// Which credential a session token is.
///
/// Carried inside the claims so an access token can never be replayed as a
/// refresh token even if the secrets were misconfigured to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims for access and refresh tokens.
///
/// `jti` makes every issued token distinct, so two pairs minted in the same
/// second still hash differently.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user UUID)
    pub sub: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl fmt::Debug for SessionClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClaims")
            .field("sub", &"[REDACTED]")
            .field("kind", &self.kind)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("jti", &"[REDACTED]")
            .finish()
    }
}

/// Claims for the conferencing transport token.
#[derive(Clone, Serialize, Deserialize)]
pub struct RoomClaims {
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl fmt::Debug for RoomClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomClaims")
            .field("user_id", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

/// Claims that expose an issued-at time for skew validation.
pub trait IssuedAt {
    fn issued_at(&self) -> i64;
}

impl IssuedAt for SessionClaims {
    fn issued_at(&self) -> i64 {
        self.iat
    }
}

impl IssuedAt for RoomClaims {
    fn issued_at(&self) -> i64 {
        self.iat
    }
}

/// Sign claims with HMAC-SHA256.
#[instrument(skip_all)]
pub fn sign_hs256<T: Serialize>(claims: &T, secret: &SecretString) -> Result<String, HubError> {
    let encoding_key = EncodingKey::from_secret(secret.expose_secret().as_bytes());

    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());

    encode(&header, claims, &encoding_key)
        .map_err(|e| HubError::Crypto(format!("JWT signing operation failed: {}", e)))
}

/// Verify an HS256 JWT and return its claims.
///
/// Validates:
/// - Token size (must be <= `MAX_JWT_SIZE_BYTES`)
/// - Signature
/// - Expiration (`exp`)
/// - Issued-at (`iat`) no further than `clock_skew_seconds` in the future
///
/// Every failure is reported as the same `Unauthorized` message.
#[instrument(skip_all)]
pub fn verify_hs256<T>(
    token: &str,
    secret: &SecretString,
    clock_skew_seconds: i64,
) -> Result<T, HubError>
where
    T: DeserializeOwned + IssuedAt,
{
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "hub.crypto",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(HubError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string()));
    }

    let decoding_key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<T>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "hub.crypto", error = %e, "Token verification failed");
        HubError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string())
    })?;

    let now = chrono::Utc::now().timestamp();
    let max_iat = now + clock_skew_seconds;
    if token_data.claims.issued_at() > max_iat {
        tracing::debug!(
            target: "hub.crypto",
            iat = token_data.claims.issued_at(),
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(HubError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string()));
    }

    Ok(token_data.claims)
}

/// Hash a password with bcrypt.
///
/// # Errors
///
/// Returns `HubError::Crypto` if the cost is outside 10-14 or hashing fails.
#[instrument(skip_all)]
pub fn hash_password(password: &str, cost: u32) -> Result<String, HubError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(HubError::Crypto(format!(
            "Invalid bcrypt cost: {} (must be {}-{})",
            cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
        )));
    }

    bcrypt::hash(password, cost)
        .map_err(|e| HubError::Crypto(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a bcrypt hash.
#[instrument(skip_all)]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, HubError> {
    bcrypt::verify(password, hash)
        .map_err(|e| HubError::Crypto(format!("Password verification failed: {}", e)))
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, HubError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| HubError::Crypto(format!("Random bytes generation failed: {}", e)))?;
    Ok(bytes)
}

/// Generate a raw one-time token (reset / email verification).
///
/// Hex encoded so it can be placed in a URL path unescaped. Only
/// `hash_token` of this value is ever persisted.
#[instrument(skip_all)]
pub fn generate_one_time_token() -> Result<SecretString, HubError> {
    let bytes = generate_random_bytes(ONE_TIME_TOKEN_BYTES)?;
    Ok(SecretString::from(hex::encode(bytes)))
}

/// One-way SHA-256 hex digest used to store tokens.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
