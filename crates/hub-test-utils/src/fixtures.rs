//! Configuration and user fixtures.

use hub_service::config::Config;
use std::collections::HashMap;

pub const TEST_ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef0123456789";
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef012345678";
pub const TEST_ROOM_SECRET: &str = "test-room-secret-0123456789abcdef0123456789ab";
pub const TEST_FRONTEND_URL: &str = "http://frontend.test";

/// Password that satisfies the minimum length rule.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Environment for a test `Config`: lowest bcrypt cost, insecure cookies,
/// no collaborator URLs.
pub fn test_vars() -> HashMap<String, String> {
    HashMap::from([
        (
            "DATABASE_URL".to_string(),
            "postgresql://test/test".to_string(),
        ),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        (
            "ACCESS_TOKEN_SECRET".to_string(),
            TEST_ACCESS_SECRET.to_string(),
        ),
        (
            "REFRESH_TOKEN_SECRET".to_string(),
            TEST_REFRESH_SECRET.to_string(),
        ),
        ("ROOM_TOKEN_SECRET".to_string(), TEST_ROOM_SECRET.to_string()),
        ("BCRYPT_COST".to_string(), "10".to_string()),
        ("FRONTEND_URL".to_string(), TEST_FRONTEND_URL.to_string()),
        ("COOKIE_SECURE".to_string(), "false".to_string()),
    ])
}

pub fn test_config() -> Config {
    Config::from_vars(&test_vars()).expect("test config must be valid")
}

/// `test_config` with extra or overridden variables.
pub fn test_config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars = test_vars();
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).expect("test config must be valid")
}
