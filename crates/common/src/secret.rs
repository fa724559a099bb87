//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across Meeting Hub for passwords,
//! signing secrets and raw one-time tokens. `SecretString` implements `Debug`
//! with redaction, so deriving `Debug` on a request or config struct that holds
//! one never leaks the value through `{:?}` or tracing fields.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LoginRequest {
//!     identifier: String,
//!     password: SecretString,
//! }
//!
//! let req = LoginRequest {
//!     identifier: "alice".to_string(),
//!     password: SecretString::from("hunter22"),
//! };
//!
//! assert!(!format!("{req:?}").contains("hunter22"));
//! assert_eq!(req.password.expose_secret(), "hunter22");
//! ```
//!
//! Use `SecretString` for:
//! - User passwords (current and new)
//! - JWT signing secrets (access, refresh, room)
//! - Raw reset / verification tokens before they are handed to the notifier

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter22");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter22"));
    }

    #[test]
    fn test_password_field_redacted_in_request() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ChangePassword {
            current_password: SecretString,
            new_password: SecretString,
        }

        let json = r#"{"current_password": "old-pass-1", "new_password": "new-pass-2"}"#;
        let req: ChangePassword = serde_json::from_str(json).expect("deserialize");

        assert_eq!(req.current_password.expose_secret(), "old-pass-1");
        let debug = format!("{req:?}");
        assert!(!debug.contains("old-pass-1"));
        assert!(!debug.contains("new-pass-2"));
    }
}
