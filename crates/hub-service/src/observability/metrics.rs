//! Metrics definitions for Meeting Hub.
//!
//! All metrics follow Prometheus naming conventions:
//! - `hub_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: route templates, unknown paths collapse to `/other`
//! - `operation`: fixed set of lifecycle and token operations
//! - `status`: success, error, or an error kind from `HubError::kind`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used by `/metrics`.
///
/// # Errors
///
/// Returns error if a recorder is already installed in this process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("hub_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("hub_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `hub_http_requests_total`, `hub_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("hub_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("hub_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse dynamic path segments into route templates.
fn normalize_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();

    match parts.as_slice() {
        ["", "api", "v1", "users", "reset-password", _] => {
            "/api/v1/users/reset-password/{token}".to_string()
        }
        ["", "api", "v1", "users", "verify-email", _] => {
            "/api/v1/users/verify-email/{token}".to_string()
        }
        ["", "api", "v1", "meetings", "user", _] => "/api/v1/meetings/user/{user_id}".to_string(),
        ["", "api", "v1", "meetings", "recordings"] => "/api/v1/meetings/recordings".to_string(),
        ["", "api", "v1", "meetings", _, "recordings"] => {
            "/api/v1/meetings/{meeting_id}/recordings".to_string()
        }
        ["", "api", "v1", "users" | "meetings", action] if is_static_action(action) => {
            path.trim_end_matches('/').to_string()
        }
        ["", "health" | "ready" | "metrics"] => path.trim_end_matches('/').to_string(),
        _ => "/other".to_string(),
    }
}

fn is_static_action(action: &str) -> bool {
    matches!(
        action,
        "register"
            | "login"
            | "logout"
            | "refresh-token"
            | "forgot-password"
            | "me"
            | "avatar"
            | "profile"
            | "change-password"
            | "send-verification"
            | "personal-room"
            | "create"
            | "schedule"
            | "token"
            | "join"
            | "leave"
            | "end"
            | "add-participants"
            | "accept-invite"
    )
}

// ============================================================================
// Domain Metrics
// ============================================================================

/// Record a meeting lifecycle operation outcome
///
/// Metric: `hub_meeting_operations_total`
/// Labels: `operation`, `status`
pub fn record_meeting_operation(operation: &str, status: &str) {
    counter!("hub_meeting_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a token issue / rotate / verify outcome
///
/// Metric: `hub_token_operations_total`
/// Labels: `operation`, `status`
pub fn record_token_operation(operation: &str, status: &str) {
    counter!("hub_token_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a single invitation delivery
///
/// Metric: `hub_invitation_deliveries_total`
/// Labels: `status` (delivered, failed)
pub fn record_invitation_delivery(status: &str) {
    counter!("hub_invitation_deliveries_total", "status" => status.to_string()).increment(1);
}

/// Record a version-conflict retry in the meeting read-modify-write loop
///
/// Metric: `hub_optimistic_retries_total`
/// Labels: `operation`
pub fn record_optimistic_retry(operation: &str) {
    counter!("hub_optimistic_retries_total", "operation" => operation.to_string()).increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `hub_db_query_duration_seconds`, `hub_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("hub_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("hub_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(404), "error");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_static_endpoints() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/api/v1/users/login"), "/api/v1/users/login");
        assert_eq!(normalize_endpoint("/api/v1/meetings/join/"), "/api/v1/meetings/join");
        assert_eq!(
            normalize_endpoint("/api/v1/meetings/recordings"),
            "/api/v1/meetings/recordings"
        );
    }

    #[test]
    fn test_normalize_dynamic_endpoints() {
        assert_eq!(
            normalize_endpoint("/api/v1/meetings/standup-42/recordings"),
            "/api/v1/meetings/{meeting_id}/recordings"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/users/reset-password/abcdef"),
            "/api/v1/users/reset-password/{token}"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/meetings/user/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/meetings/user/{user_id}"
        );
    }

    #[test]
    fn test_unknown_paths_collapse() {
        assert_eq!(normalize_endpoint("/api/v1/meetings/whatever"), "/other");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_recorders_do_not_panic_without_exporter() {
        record_meeting_operation("join", "success");
        record_token_operation("refresh", "unauthorized");
        record_invitation_delivery("failed");
        record_optimistic_retry("join");
        record_db_query("find_meeting", "success", Duration::from_millis(3));
        record_http_request("GET", "/health", 200, Duration::from_millis(1));
    }
}
