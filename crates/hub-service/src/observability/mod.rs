//! Observability for Meeting Hub.
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicitly allow-listed
//! fields. Passwords, raw tokens and signing secrets never appear in spans or
//! log events. Email addresses are logged only as correlation hashes.

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a field value for log correlation (SHA-256, first 8 hex chars).
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}
