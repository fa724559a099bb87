//! Common utilities and types shared across Meeting Hub components.

#![warn(clippy::pedantic)]

/// Module for shared observability configuration and tracing setup
pub mod config;

/// Module for the uniform JSON response envelope
pub mod envelope;

/// Module for secret types that prevent accidental logging
pub mod secret;
