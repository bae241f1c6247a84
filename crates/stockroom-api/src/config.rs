//! # Process Configuration
//!
//! Loaded once at startup from environment variables. Every value has a
//! default so the service starts with an empty environment; invalid values
//! abort startup with a [`ConfigError`].
//!
//! Variables:
//! - `PORT` (default: `8080`)
//! - `APP_NAME` (default: `Product Inventory API`)
//! - `LOG_LEVEL` (default: `info`)
//! - `CORS_ALLOW_ORIGINS` (default: `*`, comma separated)
//! - `DATABASE_URL` (unset: in-memory only)
//! - `JWT_SECRET_KEY` (default: `change-me`)
//! - `JWT_ALGORITHM` (default: `HS256`)
//! - `ACCESS_TOKEN_EXPIRE_MINUTES` (default: `60`)
//! - `BCRYPT_COST` (default: `12`)
//! - `RATE_LIMIT` (default: `100/minute`)
//! - `RATE_LIMIT_EXCLUDE_PATHS` (default: `/,/health,/docs,/openapi.json,/auth/login`)
//! - `WEBHOOK_SIGNATURE_SECRET` (default: `change-me-webhook`)
//! - `WEBHOOK_TIMEOUT_SECS` (default: `5`)

use std::str::FromStr;

use serde_json::json;
use stockroom_auth::{parse_algorithm, Algorithm, TokenSettings};
use zeroize::Zeroizing;

use crate::middleware::rate_limit::RateLimitConfig;

pub const DEFAULT_JWT_SECRET: &str = "change-me";
pub const DEFAULT_WEBHOOK_SECRET: &str = "change-me-webhook";
pub const DEFAULT_EXCLUDED_PATHS: &[&str] =
    &["/", "/health", "/docs", "/openapi.json", "/auth/login"];

const MASK: &str = "***";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            reason: reason.to_string(),
        }
    }
}

/// Runtime configuration for the API server.
///
/// Custom `Debug` redacts secrets and the database URL.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub app_name: String,
    pub log_level: String,
    pub cors_allow_origins: Vec<String>,
    pub database_url: Option<Zeroizing<String>>,
    pub jwt_secret: Zeroizing<String>,
    pub jwt_algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub bcrypt_cost: u32,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_exclude_paths: Vec<String>,
    pub webhook_signature_secret: Zeroizing<String>,
    pub webhook_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("app_name", &self.app_name)
            .field("log_level", &self.log_level)
            .field("cors_allow_origins", &self.cors_allow_origins)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field(
                "access_token_expire_minutes",
                &self.access_token_expire_minutes,
            )
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_exclude_paths", &self.rate_limit_exclude_paths)
            .field("webhook_signature_secret", &"[REDACTED]")
            .field("webhook_timeout_secs", &self.webhook_timeout_secs)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            app_name: "Product Inventory API".to_string(),
            log_level: "info".to_string(),
            cors_allow_origins: vec!["*".to_string()],
            database_url: None,
            jwt_secret: Zeroizing::new(DEFAULT_JWT_SECRET.to_string()),
            jwt_algorithm: Algorithm::HS256,
            access_token_expire_minutes: 60,
            bcrypt_cost: 12,
            rate_limit: RateLimitConfig::default(),
            rate_limit_exclude_paths: DEFAULT_EXCLUDED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            webhook_signature_secret: Zeroizing::new(DEFAULT_WEBHOOK_SECRET.to_string()),
            webhook_timeout_secs: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PORT") {
            config.port = parse_num("PORT", &v)?;
        }
        if let Some(v) = get("APP_NAME") {
            config.app_name = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v.trim().to_ascii_lowercase();
        }
        if let Some(v) = get("CORS_ALLOW_ORIGINS") {
            config.cors_allow_origins = split_list(&v);
        }
        config.database_url = get("DATABASE_URL").map(Zeroizing::new);
        if let Some(v) = get("JWT_SECRET_KEY") {
            config.jwt_secret = Zeroizing::new(v);
        }
        if let Some(v) = get("JWT_ALGORITHM") {
            config.jwt_algorithm = parse_algorithm(&v)
                .map_err(|e| ConfigError::invalid("JWT_ALGORITHM", e))?;
        }
        if let Some(v) = get("ACCESS_TOKEN_EXPIRE_MINUTES") {
            let minutes: i64 = parse_num("ACCESS_TOKEN_EXPIRE_MINUTES", &v)?;
            if minutes <= 0 {
                return Err(ConfigError::invalid(
                    "ACCESS_TOKEN_EXPIRE_MINUTES",
                    "must be a positive number of minutes",
                ));
            }
            config.access_token_expire_minutes = minutes;
        }
        if let Some(v) = get("BCRYPT_COST") {
            let cost: u32 = parse_num("BCRYPT_COST", &v)?;
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::invalid("BCRYPT_COST", "must be between 4 and 31"));
            }
            config.bcrypt_cost = cost;
        }
        if let Some(v) = get("RATE_LIMIT") {
            config.rate_limit = RateLimitConfig::from_str(&v)
                .map_err(|e| ConfigError::invalid("RATE_LIMIT", e))?;
        }
        if let Some(v) = get("RATE_LIMIT_EXCLUDE_PATHS") {
            config.rate_limit_exclude_paths = split_list(&v);
        }
        if let Some(v) = get("WEBHOOK_SIGNATURE_SECRET") {
            config.webhook_signature_secret = Zeroizing::new(v);
        }
        if let Some(v) = get("WEBHOOK_TIMEOUT_SECS") {
            let secs: u64 = parse_num("WEBHOOK_TIMEOUT_SECS", &v)?;
            if secs == 0 {
                return Err(ConfigError::invalid("WEBHOOK_TIMEOUT_SECS", "must be positive"));
            }
            config.webhook_timeout_secs = secs;
        }

        Ok(config)
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings::new(
            self.jwt_secret.as_str(),
            self.jwt_algorithm,
            self.access_token_expire_minutes,
        )
    }

    /// Names of secrets still set to their shipped defaults.
    pub fn default_secrets(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.jwt_secret.as_str() == DEFAULT_JWT_SECRET {
            out.push("JWT_SECRET_KEY");
        }
        if self.webhook_signature_secret.as_str() == DEFAULT_WEBHOOK_SECRET {
            out.push("WEBHOOK_SIGNATURE_SECRET");
        }
        out
    }

    /// Configuration as JSON with every secret, password and key masked.
    pub fn masked(&self) -> serde_json::Value {
        json!({
            "APP_NAME": self.app_name,
            "PORT": self.port,
            "LOG_LEVEL": self.log_level,
            "CORS_ALLOW_ORIGINS": self.cors_allow_origins,
            "DATABASE_URL": self.database_url.as_ref().map(|_| MASK),
            "JWT_SECRET_KEY": MASK,
            "JWT_ALGORITHM": format!("{:?}", self.jwt_algorithm),
            "ACCESS_TOKEN_EXPIRE_MINUTES": self.access_token_expire_minutes,
            "BCRYPT_COST": self.bcrypt_cost,
            "RATE_LIMIT": self.rate_limit.to_string(),
            "RATE_LIMIT_EXCLUDE_PATHS": self.rate_limit_exclude_paths,
            "WEBHOOK_SIGNATURE_SECRET": MASK,
            "WEBHOOK_TIMEOUT_SECS": self.webhook_timeout_secs,
        })
    }
}

fn parse_num<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| ConfigError::invalid(var, e))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
