//! Middleware for Meeting Hub.
//!
//! # Components
//!
//! - `auth` - Access token authentication for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::{require_user_auth, AuthContext, AuthState};
pub use http_metrics::http_metrics_middleware;
