//! Meeting Hub service library.
//!
//! Meeting lifecycle, membership and invitations, session tokens, and the
//! credential store behind the Meeting Hub HTTP API.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - JWT signing, password hashing, one-time tokens
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and HTTP metrics
//! - `models` - Aggregates, projections, request bodies
//! - `observability` - Metrics and log correlation helpers
//! - `repositories` - Database access layer
//! - `routes` - Router and application state
//! - `services` - Business logic layer

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
