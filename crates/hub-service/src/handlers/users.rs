//! User handlers.
//!
//! Public:
//!
//! - `POST /api/v1/users/register`
//! - `POST /api/v1/users/login` - sets `accessToken` / `refreshToken` cookies
//! - `POST /api/v1/users/refresh-token` - token from body or `refreshToken` cookie
//! - `POST /api/v1/users/forgot-password`
//! - `POST /api/v1/users/reset-password/:token`
//! - `GET /api/v1/users/verify-email/:token`
//!
//! Authenticated: logout, me, avatar, profile, change-password,
//! send-verification, personal-room.

use crate::errors::HubError;
use crate::handlers::{
    content_type, created, ok, ok_message, parse_json, parse_json_or_default, Enveloped,
};
use crate::middleware::auth::{cookie_value, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::middleware::AuthContext;
use crate::models::{
    ChangePasswordRequest, CurrentUserView, ForgotPasswordRequest, LoginRequest, LoginResponse,
    PersonalRoomRequest, ProfileUpdate, PublicUser, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, TokenPair,
};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use common::secret::ExposeSecret;
use std::sync::Arc;
use tracing::instrument;

// ============================================================================
// Cookies
// ============================================================================

fn session_cookie(
    name: &'static str,
    value: String,
    max_age_seconds: i64,
    secure: bool,
) -> Cookie<'static> {
    let same_site = if secure { SameSite::None } else { SameSite::Lax };
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

fn with_session(jar: CookieJar, state: &AppState, pair: &TokenPair) -> CookieJar {
    let secure = state.config.cookie_secure;
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        state.tokens.access_ttl_seconds(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        state.tokens.refresh_ttl_seconds(),
        secure,
    ))
}

/// Expire both session cookies. Sent even when the request carried none,
/// since a bearer-authenticated logout still ends the browser session.
fn without_session(jar: CookieJar, state: &AppState) -> CookieJar {
    let secure = state.config.cookie_secure;
    jar.add(session_cookie(ACCESS_TOKEN_COOKIE, String::new(), 0, secure))
        .add(session_cookie(REFRESH_TOKEN_COOKIE, String::new(), 0, secure))
}

// ============================================================================
// Public
// ============================================================================

#[instrument(skip_all, name = "hub.handlers.users.register")]
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Enveloped<PublicUser>, HubError> {
    let request: RegisterRequest = parse_json(&body)?;
    let user = state
        .credentials
        .register(&request.username, &request.email, &request.password)
        .await?;
    Ok(created("User registered successfully", PublicUser::from(&user)))
}

#[instrument(skip_all, name = "hub.handlers.users.login")]
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, HubError> {
    let request: LoginRequest = parse_json(&body)?;
    let user = state
        .credentials
        .authenticate(
            request.username.as_deref(),
            request.email.as_deref(),
            &request.password,
        )
        .await?;
    let tokens = state.tokens.issue_token_pair(user.user_id).await?;

    Ok((
        with_session(jar, &state, &tokens),
        ok(
            "User logged in successfully",
            LoginResponse {
                user: PublicUser::from(&user),
                tokens,
            },
        ),
    ))
}

#[instrument(skip_all, name = "hub.handlers.users.refresh")]
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, HubError> {
    let request: RefreshRequest = parse_json_or_default(&body)?;

    let presented = match &request.refresh_token {
        Some(token) => token.expose_secret().to_string(),
        None => cookie_value(&jar, REFRESH_TOKEN_COOKIE)
            .ok_or_else(|| HubError::Unauthorized("Unauthorized request".to_string()))?,
    };

    let tokens = state.tokens.refresh(&presented).await?;
    Ok((
        with_session(jar, &state, &tokens),
        ok("Token refreshed", tokens),
    ))
}

#[instrument(skip_all, name = "hub.handlers.users.forgot_password")]
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Enveloped<()>, HubError> {
    let request: ForgotPasswordRequest = parse_json(&body)?;
    state.credentials.send_password_reset(&request.email).await?;
    Ok(ok_message("Password reset email sent"))
}

#[instrument(skip_all, name = "hub.handlers.users.reset_password")]
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Enveloped<()>, HubError> {
    let request: ResetPasswordRequest = parse_json(&body)?;
    state
        .credentials
        .complete_password_reset(&token, &request.new_password)
        .await?;
    Ok(ok_message("Password reset successfully"))
}

#[instrument(skip_all, name = "hub.handlers.users.verify_email")]
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Enveloped<()>, HubError> {
    state.credentials.complete_email_verification(&token).await?;
    Ok(ok_message("Email verified successfully"))
}

// ============================================================================
// Authenticated
// ============================================================================

#[instrument(skip_all, name = "hub.handlers.users.logout")]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    jar: CookieJar,
) -> Result<impl IntoResponse, HubError> {
    state.tokens.invalidate(auth.user_id).await?;
    Ok((
        without_session(jar, &state),
        ok_message("User logged out successfully"),
    ))
}

#[instrument(skip_all, name = "hub.handlers.users.me")]
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Enveloped<CurrentUserView>, HubError> {
    let user = state.credentials.get_user(auth.user_id).await?;
    let personal_room = state.meetings.personal_room(&user).await?;
    Ok(ok(
        "Current user fetched",
        CurrentUserView {
            user: PublicUser::from(&user),
            personal_room,
        },
    ))
}

/// Raw request body is the image; `Content-Type` is passed through.
#[instrument(skip_all, name = "hub.handlers.users.avatar")]
pub async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Enveloped<PublicUser>, HubError> {
    let user = state
        .credentials
        .update_avatar(auth.user_id, body, &content_type(&headers))
        .await?;
    Ok(ok("Avatar updated successfully", PublicUser::from(&user)))
}

#[instrument(skip_all, name = "hub.handlers.users.profile")]
pub async fn edit_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<PublicUser>, HubError> {
    let update: ProfileUpdate = parse_json_or_default(&body)?;
    let user = state.credentials.edit_profile(auth.user_id, &update).await?;
    Ok(ok("User profile updated successfully", PublicUser::from(&user)))
}

#[instrument(skip_all, name = "hub.handlers.users.change_password")]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<()>, HubError> {
    let request: ChangePasswordRequest = parse_json(&body)?;
    state
        .credentials
        .change_password(auth.user_id, &request.current_password, &request.new_password)
        .await?;
    Ok(ok_message("Password changed successfully"))
}

#[instrument(skip_all, name = "hub.handlers.users.send_verification")]
pub async fn send_verification_email(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Enveloped<()>, HubError> {
    state.credentials.send_email_verification(auth.user_id).await?;
    Ok(ok_message("Verification email sent"))
}

#[instrument(skip_all, name = "hub.handlers.users.personal_room")]
pub async fn set_personal_room(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Enveloped<PublicUser>, HubError> {
    let request: PersonalRoomRequest = parse_json(&body)?;
    let user = state
        .meetings
        .promote_to_personal_room(auth.user_id, &request.meeting_id)
        .await?;
    Ok(ok("Personal room updated successfully", user))
}
