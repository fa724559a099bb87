//! HTTP routes for Meeting Hub.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_user_auth, AuthState};
use crate::repositories::{MeetingRepository, UserRepository};
use crate::services::{BlobStore, CredentialService, MeetingService, Notifier, TokenService};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Limit for JSON request bodies.
pub const JSON_BODY_LIMIT_BYTES: usize = 16 * 1024;

/// Limit for avatar and recording uploads.
pub const UPLOAD_BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    pub tokens: Arc<TokenService>,

    pub credentials: Arc<CredentialService>,

    pub meetings: Arc<MeetingService>,

    /// User store, used directly only by the readiness probe.
    pub users: Arc<dyn UserRepository>,
}

impl AppState {
    /// Wire services over the given repositories and collaborators.
    pub fn new(
        config: Config,
        users: Arc<dyn UserRepository>,
        meetings: Arc<dyn MeetingRepository>,
        notifier: Arc<dyn Notifier>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(Arc::clone(&users), &config));
        let credentials = Arc::new(CredentialService::new(
            Arc::clone(&users),
            Arc::clone(&notifier),
            Arc::clone(&blob_store),
            &config,
        ));
        let meeting_service = Arc::new(MeetingService::new(
            meetings,
            Arc::clone(&users),
            notifier,
            blob_store,
            &config,
        ));

        Self {
            config,
            tokens,
            credentials,
            meetings: meeting_service,
            users,
        }
    }
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(
                target: "hub.routes",
                error = %e,
                "FRONTEND_URL is not a valid origin; cross-origin requests will be refused"
            );
            layer
        }
    }
}

/// Build the application routes.
///
/// - `/health`, `/ready`, `/metrics` - operational, unversioned
/// - `/api/v1/users/...` - registration, login, token refresh, password and
///   verification flows (public); profile and session management (authenticated)
/// - `/api/v1/meetings/...` - meeting lifecycle and recordings (authenticated)
///
/// Layer order, outermost first: HTTP metrics, CORS, timeout, trace.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        tokens: Arc::clone(&state.tokens),
    });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/users/register", post(handlers::register))
        .route("/api/v1/users/login", post(handlers::login))
        .route("/api/v1/users/refresh-token", post(handlers::refresh_token))
        .route(
            "/api/v1/users/forgot-password",
            post(handlers::forgot_password),
        )
        .route(
            "/api/v1/users/reset-password/:token",
            post(handlers::reset_password),
        )
        .route("/api/v1/users/verify-email/:token", get(handlers::verify_email))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT_BYTES))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Upload routes override the JSON body limit; the innermost limit wins.
    let upload_limit = || DefaultBodyLimit::max(UPLOAD_BODY_LIMIT_BYTES);

    let protected_routes = Router::new()
        .route("/api/v1/users/logout", post(handlers::logout))
        .route("/api/v1/users/me", get(handlers::get_current_user))
        .route(
            "/api/v1/users/avatar",
            patch(handlers::update_avatar).layer(upload_limit()),
        )
        .route("/api/v1/users/profile", patch(handlers::edit_profile))
        .route(
            "/api/v1/users/change-password",
            post(handlers::change_password),
        )
        .route(
            "/api/v1/users/send-verification",
            post(handlers::send_verification_email),
        )
        .route(
            "/api/v1/users/personal-room",
            post(handlers::set_personal_room),
        )
        .route("/api/v1/meetings/create", post(handlers::create_meeting))
        .route("/api/v1/meetings/schedule", post(handlers::schedule_meeting))
        .route("/api/v1/meetings/token", post(handlers::create_room_token))
        .route("/api/v1/meetings/join", post(handlers::join_meeting))
        .route("/api/v1/meetings/leave", post(handlers::leave_meeting))
        .route("/api/v1/meetings/end", post(handlers::end_meeting))
        .route(
            "/api/v1/meetings/user/:user_id",
            get(handlers::list_user_meetings),
        )
        .route(
            "/api/v1/meetings/add-participants",
            post(handlers::add_participants),
        )
        .route(
            "/api/v1/meetings/accept-invite",
            post(handlers::accept_invite),
        )
        .route(
            "/api/v1/meetings/recordings",
            get(handlers::list_all_recordings),
        )
        .route(
            "/api/v1/meetings/:meeting_id/recordings",
            post(handlers::upload_recording)
                .layer(upload_limit())
                .get(handlers::get_recordings),
        )
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT_BYTES))
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_user_auth,
        ))
        .with_state(state.clone());

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer(&state.config.frontend_url))
        .layer(middleware::from_fn(http_metrics_middleware))
}
