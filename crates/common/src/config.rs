//! Shared observability configuration for Meeting Hub components.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines (local development)
    Text,
    /// One JSON object per event (log shippers)
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive, e.g. `hub_service=debug,tower_http=info`
    pub log_filter: String,
    /// Output format
    pub log_format: LogFormat,
}

/// Errors raised while reading observability settings.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Invalid LOG_FORMAT: {0} (expected 'text' or 'json')")]
    InvalidLogFormat(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

impl ObservabilityConfig {
    /// Read `RUST_LOG` and `LOG_FORMAT` from a variable map, falling back to
    /// `default_filter` when `RUST_LOG` is unset.
    ///
    /// # Errors
    ///
    /// Returns `ObservabilityError::InvalidLogFormat` for unknown formats.
    pub fn from_vars(
        vars: &HashMap<String, String>,
        default_filter: &str,
    ) -> Result<Self, ObservabilityError> {
        let log_filter = vars
            .get("RUST_LOG")
            .cloned()
            .unwrap_or_else(|| default_filter.to_string());

        let log_format = match vars.get("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            None => LogFormat::Text,
            Some(v) if v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => return Err(ObservabilityError::InvalidLogFormat(other)),
        };

        Ok(Self {
            log_filter,
            log_format,
        })
    }

    /// Install the global tracing subscriber.
    ///
    /// # Errors
    ///
    /// Returns `ObservabilityError::Install` if a global subscriber is already set.
    pub fn init_tracing(&self) -> Result<(), ObservabilityError> {
        let filter = EnvFilter::try_new(&self.log_filter)
            .map_err(|e| ObservabilityError::Install(e.to_string()))?;

        let registry = tracing_subscriber::registry().with(filter);
        match self.log_format {
            LogFormat::Text => registry
                .with(tracing_subscriber::fmt::layer())
                .try_init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init(),
        }
        .map_err(|e| ObservabilityError::Install(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = ObservabilityConfig::from_vars(&HashMap::new(), "hub_service=info")
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.log_filter, "hub_service=info");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_json_format_case_insensitive() {
        let vars = HashMap::from([("LOG_FORMAT".to_string(), "JSON".to_string())]);
        let config =
            ObservabilityConfig::from_vars(&vars, "info").unwrap_or_else(|_| unreachable!());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rust_log_overrides_default() {
        let vars = HashMap::from([("RUST_LOG".to_string(), "debug".to_string())]);
        let config =
            ObservabilityConfig::from_vars(&vars, "info").unwrap_or_else(|_| unreachable!());
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let vars = HashMap::from([("LOG_FORMAT".to_string(), "xml".to_string())]);
        let result = ObservabilityConfig::from_vars(&vars, "info");
        assert!(matches!(result, Err(ObservabilityError::InvalidLogFormat(v)) if v == "xml"));
    }
}
