//! Configuration management
//!
//! This module handles loading and parsing configuration for Schoolgate.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. The resulting
//! `Config` is built once at startup and handed to each component; request
//! handlers never read the environment themselves.

use serde::{Deserialize, Serialize};

/// Signing secret used when none is configured outside production
const DEV_FALLBACK_SECRET: &str = "dev-only-secret-do-not-use-in-production";

/// Minimum signing secret length before a warning is logged
const MIN_SECRET_LEN: usize = 32;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session token and cookie configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Login rate limit thresholds
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Attempt ledger retention
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Security event channel
    #[serde(default)]
    pub security_log: SecurityLogConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (default)
    #[default]
    Development,
    /// Production deployment
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Upper bound for a single request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/schoolgate.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing secret for session tokens
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Token lifetime in seconds (also the cookie Max-Age)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
    /// Session cookie attributes
    #[serde(default)]
    pub cookie: CookieConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: default_token_ttl(),
            cookie: CookieConfig::default(),
        }
    }
}

fn default_token_ttl() -> i64 {
    24 * 60 * 60 // 24 hours
}

/// Session cookie attributes
///
/// The cookie is always emitted with `HttpOnly` and `Secure`; only the name,
/// path and SameSite policy are configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_name")]
    pub name: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            path: default_cookie_path(),
            same_site: SameSite::default(),
        }
    }
}

fn default_cookie_name() -> String {
    "auth-token".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// SameSite cookie policy. `None` is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// Login rate limit thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Unresolved failures allowed per network identity within the window
    #[serde(default = "default_identity_max")]
    pub identity_max_failures: i64,
    /// Per-identity window in seconds
    #[serde(default = "default_identity_window")]
    pub identity_window_secs: i64,
    /// Unresolved failures allowed per account name within the window
    #[serde(default = "default_account_max")]
    pub account_max_failures: i64,
    /// Per-account window in seconds
    #[serde(default = "default_account_window")]
    pub account_window_secs: i64,
    /// Budget for each ledger query before the limiter fails open
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            identity_max_failures: default_identity_max(),
            identity_window_secs: default_identity_window(),
            account_max_failures: default_account_max(),
            account_window_secs: default_account_window(),
            store_timeout_ms: default_store_timeout(),
        }
    }
}

fn default_identity_max() -> i64 {
    5
}

fn default_identity_window() -> i64 {
    15 * 60 // 15 minutes
}

fn default_account_max() -> i64 {
    10
}

fn default_account_window() -> i64 {
    24 * 60 * 60 // 24 hours
}

fn default_store_timeout() -> u64 {
    2000
}

/// Attempt ledger retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Rows older than this many days are deleted by the sweeper
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Shared secret expected as `Authorization: Bearer <secret>` on the cron endpoint
    #[serde(default)]
    pub cron_secret: Option<String>,
    /// Run the sweeper in-process at this interval (disabled when unset)
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            cron_secret: None,
            sweep_interval_secs: None,
        }
    }
}

fn default_retention_days() -> i64 {
    30
}

/// Security event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLogConfig {
    /// Bounded queue size between request handlers and the sink worker
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for SecurityLogConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - SCHOOLGATE_ENVIRONMENT
    /// - SCHOOLGATE_SERVER_HOST / SCHOOLGATE_SERVER_PORT / SCHOOLGATE_SERVER_CORS_ORIGIN
    /// - SCHOOLGATE_DATABASE_DRIVER / SCHOOLGATE_DATABASE_URL
    /// - SCHOOLGATE_AUTH_JWT_SECRET / SCHOOLGATE_AUTH_TOKEN_TTL_SECS
    /// - SCHOOLGATE_CRON_SECRET
    /// - SCHOOLGATE_RETENTION_SWEEP_INTERVAL_SECS
    pub fn load_with_env(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("SCHOOLGATE_ENVIRONMENT") {
            match env.to_lowercase().as_str() {
                "production" => self.environment = Environment::Production,
                "development" => self.environment = Environment::Development,
                _ => {} // Ignore invalid values
            }
        }

        // Server configuration
        if let Ok(host) = std::env::var("SCHOOLGATE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SCHOOLGATE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("SCHOOLGATE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("SCHOOLGATE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("SCHOOLGATE_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("SCHOOLGATE_AUTH_JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.jwt_secret = Some(secret);
            }
        }
        if let Ok(ttl) = std::env::var("SCHOOLGATE_AUTH_TOKEN_TTL_SECS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                if ttl > 0 {
                    self.auth.token_ttl_secs = ttl;
                }
            }
        }

        // Retention configuration
        if let Ok(secret) = std::env::var("SCHOOLGATE_CRON_SECRET") {
            if !secret.is_empty() {
                self.retention.cron_secret = Some(secret);
            }
        }
        if let Ok(interval) = std::env::var("SCHOOLGATE_RETENTION_SWEEP_INTERVAL_SECS") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.retention.sweep_interval_secs = Some(interval);
            }
        }
    }

    /// Check the loaded configuration before the server starts.
    ///
    /// Production refuses to start without a signing secret or a cron secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.is_production() {
            if self.auth.jwt_secret.is_none() {
                return Err(ConfigError::ValidationError(
                    "auth.jwt_secret must be set in production".to_string(),
                ));
            }
            if self.retention.cron_secret.is_none() {
                return Err(ConfigError::ValidationError(
                    "retention.cron_secret must be set in production".to_string(),
                ));
            }
        }
        if self.auth.token_ttl_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.rate_limit.identity_max_failures <= 0 || self.rate_limit.account_max_failures <= 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit thresholds must be positive".to_string(),
            ));
        }
        if self.retention.retention_days <= 0 {
            return Err(ConfigError::ValidationError(
                "retention.retention_days must be positive".to_string(),
            ));
        }
        if self.security_log.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "security_log.channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the token signing secret.
    ///
    /// Falls back to a development-only secret outside production.
    pub fn signing_secret(&self) -> Result<Vec<u8>, ConfigError> {
        match &self.auth.jwt_secret {
            Some(secret) => {
                if secret.len() < MIN_SECRET_LEN {
                    tracing::warn!(
                        "auth.jwt_secret should be at least {} characters",
                        MIN_SECRET_LEN
                    );
                }
                Ok(secret.as_bytes().to_vec())
            }
            None if self.environment.is_production() => Err(ConfigError::ValidationError(
                "auth.jwt_secret must be set in production".to_string(),
            )),
            None => {
                tracing::warn!("auth.jwt_secret not set, using development fallback secret");
                Ok(DEV_FALLBACK_SECRET.as_bytes().to_vec())
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
