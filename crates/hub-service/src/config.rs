use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default bcrypt cost factor (~200ms per hash).
pub const DEFAULT_BCRYPT_COST: u32 = 12;
/// Lowest accepted bcrypt cost.
pub const MIN_BCRYPT_COST: u32 = 10;
/// Highest accepted bcrypt cost.
pub const MAX_BCRYPT_COST: u32 = 14;

/// Default clock skew tolerance for JWT `iat` validation.
pub const DEFAULT_JWT_CLOCK_SKEW_SECONDS: i64 = 300;
/// Upper bound for configured clock skew.
pub const MAX_JWT_CLOCK_SKEW_SECONDS: i64 = 600;

pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 900;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 10 * 24 * 3600;
pub const DEFAULT_ROOM_TOKEN_TTL_SECONDS: i64 = 3600;
pub const DEFAULT_COLLABORATOR_TIMEOUT_SECONDS: u64 = 10;

/// Minimum length of HMAC signing secrets, in bytes.
pub const MIN_SIGNING_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_address: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub room_token_secret: SecretString,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub room_token_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub jwt_clock_skew_seconds: i64,
    /// Base URL of the web client; used for invite/reset/verify links and CORS.
    pub frontend_url: String,
    pub default_avatar_url: Option<String>,
    pub notifier_url: Option<String>,
    pub blob_store_url: Option<String>,
    pub collaborator_timeout_seconds: u64,
    pub cookie_secure: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let access_token_secret = signing_secret(vars, "ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = signing_secret(vars, "REFRESH_TOKEN_SECRET")?;
        let room_token_secret = signing_secret(vars, "ROOM_TOKEN_SECRET")?;

        if access_token_secret.expose_secret() == refresh_token_secret.expose_secret() {
            return Err(ConfigError::InvalidValue {
                name: "REFRESH_TOKEN_SECRET".to_string(),
                reason: "must differ from ACCESS_TOKEN_SECRET".to_string(),
            });
        }

        let database_max_connections = parsed(vars, "DATABASE_MAX_CONNECTIONS", 5u32)?;
        let access_token_ttl_seconds =
            positive(vars, "ACCESS_TOKEN_TTL_SECONDS", DEFAULT_ACCESS_TOKEN_TTL_SECONDS)?;
        let refresh_token_ttl_seconds =
            positive(vars, "REFRESH_TOKEN_TTL_SECONDS", DEFAULT_REFRESH_TOKEN_TTL_SECONDS)?;
        let room_token_ttl_seconds =
            positive(vars, "ROOM_TOKEN_TTL_SECONDS", DEFAULT_ROOM_TOKEN_TTL_SECONDS)?;

        if refresh_token_ttl_seconds <= access_token_ttl_seconds {
            return Err(ConfigError::InvalidValue {
                name: "REFRESH_TOKEN_TTL_SECONDS".to_string(),
                reason: "must be longer than ACCESS_TOKEN_TTL_SECONDS".to_string(),
            });
        }

        let bcrypt_cost = parsed(vars, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                name: "BCRYPT_COST".to_string(),
                reason: format!(
                    "{} is outside {}-{}",
                    bcrypt_cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
                ),
            });
        }

        let jwt_clock_skew_seconds =
            parsed(vars, "JWT_CLOCK_SKEW_SECONDS", DEFAULT_JWT_CLOCK_SKEW_SECONDS)?;
        if !(1..=MAX_JWT_CLOCK_SKEW_SECONDS).contains(&jwt_clock_skew_seconds) {
            return Err(ConfigError::InvalidValue {
                name: "JWT_CLOCK_SKEW_SECONDS".to_string(),
                reason: format!("must be between 1 and {}", MAX_JWT_CLOCK_SKEW_SECONDS),
            });
        }

        let frontend_url = vars
            .get("FRONTEND_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost:5173".to_string());

        let collaborator_timeout_seconds = parsed(
            vars,
            "COLLABORATOR_TIMEOUT_SECONDS",
            DEFAULT_COLLABORATOR_TIMEOUT_SECONDS,
        )?;

        let cookie_secure = parsed(vars, "COOKIE_SECURE", true)?;

        Ok(Config {
            database_url,
            database_max_connections,
            bind_address,
            access_token_secret,
            refresh_token_secret,
            room_token_secret,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            room_token_ttl_seconds,
            bcrypt_cost,
            jwt_clock_skew_seconds,
            frontend_url,
            default_avatar_url: vars.get("DEFAULT_AVATAR_URL").cloned(),
            notifier_url: vars.get("NOTIFIER_URL").cloned(),
            blob_store_url: vars.get("BLOB_STORE_URL").cloned(),
            collaborator_timeout_seconds,
            cookie_secure,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn signing_secret(vars: &HashMap<String, String>, name: &str) -> Result<SecretString, ConfigError> {
    let value = required(vars, name)?;
    if value.len() < MIN_SIGNING_SECRET_BYTES {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be at least {} bytes", MIN_SIGNING_SECRET_BYTES),
        });
    }
    Ok(SecretString::from(value))
}

fn parsed<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("cannot parse '{}'", raw),
        }),
    }
}

fn positive(vars: &HashMap<String, String>, name: &str, default: i64) -> Result<i64, ConfigError> {
    let value = parsed(vars, name, default)?;
    if value <= 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/test".to_string(),
            ),
            ("ACCESS_TOKEN_SECRET".to_string(), "a".repeat(32)),
            ("REFRESH_TOKEN_SECRET".to_string(), "r".repeat(32)),
            ("ROOM_TOKEN_SECRET".to_string(), "m".repeat(32)),
        ])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.database_url, "postgresql://localhost/test");
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.access_token_ttl_seconds, 900);
        assert_eq!(config.refresh_token_ttl_seconds, 864_000);
        assert_eq!(config.bcrypt_cost, DEFAULT_BCRYPT_COST);
        assert_eq!(config.frontend_url, "http://localhost:5173");
        assert!(config.notifier_url.is_none());
        assert!(config.cookie_secure);
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_missing_refresh_secret() {
        let mut vars = base_vars();
        vars.remove("REFRESH_TOKEN_SECRET");

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "REFRESH_TOKEN_SECRET")
        );
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut vars = base_vars();
        vars.insert("ACCESS_TOKEN_SECRET".to_string(), "short".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "ACCESS_TOKEN_SECRET")
        );
    }

    #[test]
    fn test_identical_access_and_refresh_secrets_rejected() {
        let mut vars = base_vars();
        vars.insert("REFRESH_TOKEN_SECRET".to_string(), "a".repeat(32));

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "REFRESH_TOKEN_SECRET")
        );
    }

    #[test]
    fn test_bcrypt_cost_out_of_range() {
        let mut vars = base_vars();
        vars.insert("BCRYPT_COST".to_string(), "4".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, reason }) if name == "BCRYPT_COST" && reason.contains("10-14"))
        );
    }

    #[test]
    fn test_refresh_ttl_must_exceed_access_ttl() {
        let mut vars = base_vars();
        vars.insert("ACCESS_TOKEN_TTL_SECONDS".to_string(), "3600".to_string());
        vars.insert("REFRESH_TOKEN_TTL_SECONDS".to_string(), "60".to_string());

        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_unparseable_number() {
        let mut vars = base_vars();
        vars.insert("ROOM_TOKEN_TTL_SECONDS".to_string(), "soon".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "ROOM_TOKEN_TTL_SECONDS")
        );
    }

    #[test]
    fn test_frontend_url_trailing_slash_trimmed() {
        let mut vars = base_vars();
        vars.insert(
            "FRONTEND_URL".to_string(),
            "https://app.example.com/".to_string(),
        );
        vars.insert("COOKIE_SECURE".to_string(), "false".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.frontend_url, "https://app.example.com");
        assert!(!config.cookie_secure);
    }
}
