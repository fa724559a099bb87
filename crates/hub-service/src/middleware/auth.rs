//! Authentication middleware for protected routes.
//!
//! Accepts the access token from either the `Authorization: Bearer` header
//! or the `accessToken` cookie set at login. The header wins when both are
//! present. On success the caller's identity is stored in request extensions
//! as an `AuthContext`.

use crate::errors::HubError;
use crate::services::TokenService;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenService>,
}

/// Authenticated caller, inserted by `require_user_auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
}

/// Value of the named cookie, if the request carries a non-empty one.
pub fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn extract_access_token(headers: &HeaderMap) -> Result<String, HubError> {
    if let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        return auth_header
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| {
                tracing::debug!(target: "hub.middleware.auth", "Invalid Authorization header format");
                HubError::Unauthorized("Invalid Authorization header format".to_string())
            });
    }

    cookie_value(&CookieJar::from_headers(headers), ACCESS_TOKEN_COOKIE).ok_or_else(|| {
        tracing::debug!(target: "hub.middleware.auth", "No access token presented");
        HubError::Unauthorized("Unauthorized request".to_string())
    })
}

/// Authentication middleware for user access tokens.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing, malformed or expired
/// - Continues to the next handler with `AuthContext` in extensions otherwise
#[instrument(skip_all, name = "hub.middleware.user_auth")]
pub async fn require_user_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HubError> {
    let token = extract_access_token(req.headers())?;
    let user_id = state.tokens.verify_access_token(&token)?;

    req.extensions_mut().insert(AuthContext { user_id });

    Ok(next.run(req).await)
}
