//! Uniform JSON response envelope.
//!
//! Every HTTP response produced by Meeting Hub, success or failure, has the
//! shape `{ "success": bool, "message": string, "code": int, "data"?: any }`.

use serde::{Deserialize, Serialize};

/// Response envelope wrapping an optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Successful response carrying `data`.
    pub fn ok(message: impl Into<String>, code: u16, data: T) -> Self {
        Self {
            success: code < 400,
            message: message.into(),
            code,
            data: Some(data),
        }
    }
}

impl ApiEnvelope<()> {
    /// Response without a payload.
    pub fn message(message: impl Into<String>, code: u16) -> Self {
        Self {
            success: code < 400,
            message: message.into(),
            code,
            data: None,
        }
    }

    /// Failure response. `success` is always false.
    pub fn failure(message: impl Into<String>, code: u16) -> Self {
        Self {
            success: false,
            message: message.into(),
            code,
            data: None,
        }
    }
}
