//! Relay server configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use switchboard_shared_config::{
    parse_bool_env, parse_env, CommonConfig, Environment, ListenConfig,
};

/// Minimum required length for JWT_SECRET to be considered secure
const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Development fallback for JWT_SECRET
const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Default ticket lifetime
pub const DEFAULT_TICKET_TTL: Duration = Duration::from_secs(30);

/// Default window for the first `auth` frame on a pending connection
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// JWT secret for bearer token verification
    pub jwt_secret: String,

    /// HMAC key for connection tickets
    pub ticket_secret: String,

    /// Ticket lifetime (default: 30s)
    pub ticket_ttl: Duration,

    /// How long a pending connection may wait before sending `auth` (default: 5s)
    pub auth_timeout: Duration,

    /// Accept upgrades without credentials and expect an `auth` frame (default: true)
    pub message_auth_enabled: bool,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Configuration with development defaults and explicit secrets
    pub fn new(jwt_secret: impl Into<String>, ticket_secret: impl Into<String>) -> Self {
        Self {
            common: CommonConfig {
                listen: ListenConfig::default(),
                environment: Environment::Development,
                log_level: "info".to_string(),
            },
            jwt_secret: jwt_secret.into(),
            ticket_secret: ticket_secret.into(),
            ticket_ttl: DEFAULT_TICKET_TTL,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            message_auth_enabled: true,
            cors_allowed_origins: None,
        }
    }

    /// Load configuration from environment variables
    ///
    /// In production mode, this function requires:
    /// - `JWT_SECRET`: Must be set and at least 32 characters long
    /// - `TICKET_SECRET`: Must be explicitly set
    ///
    /// In development/staging mode, sensible defaults are used for convenience.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        )
        .unwrap_or_default();
        let is_production = environment.is_production();

        let jwt_secret = Self::load_jwt_secret(is_production)?;
        let ticket_secret = Self::load_ticket_secret(is_production, &jwt_secret)?;

        let common = CommonConfig::from_env().context("Failed to load common config")?;

        Ok(Self {
            common,
            jwt_secret,
            ticket_secret,
            ticket_ttl: Duration::from_secs(
                parse_env("TICKET_TTL_SECS", DEFAULT_TICKET_TTL.as_secs())
                    .context("Invalid TICKET_TTL_SECS value")?,
            ),
            auth_timeout: Duration::from_secs(
                parse_env("AUTH_TIMEOUT_SECS", DEFAULT_AUTH_TIMEOUT.as_secs())
                    .context("Invalid AUTH_TIMEOUT_SECS value")?,
            ),
            message_auth_enabled: parse_bool_env("MESSAGE_AUTH_ENABLED", true)
                .context("Invalid MESSAGE_AUTH_ENABLED value")?,
            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }

    /// Load and validate JWT_SECRET
    ///
    /// In production:
    /// - JWT_SECRET must be explicitly set
    /// - Must be at least MIN_JWT_SECRET_LENGTH characters
    ///
    /// In development: uses a default value with a warning
    fn load_jwt_secret(is_production: bool) -> Result<String> {
        match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => {
                if is_production && secret.len() < MIN_JWT_SECRET_LENGTH {
                    bail!(
                        "JWT_SECRET must be at least {} characters in production (got {})",
                        MIN_JWT_SECRET_LENGTH,
                        secret.len()
                    );
                }
                Ok(secret)
            }
            _ if is_production => {
                bail!(
                    "JWT_SECRET environment variable is required in production. \
                     Please set a secure secret of at least {} characters.",
                    MIN_JWT_SECRET_LENGTH
                );
            }
            _ => {
                tracing::warn!(
                    "JWT_SECRET not set, using insecure default. \
                     This is only acceptable in development mode."
                );
                Ok(DEV_JWT_SECRET.to_string())
            }
        }
    }

    /// Load TICKET_SECRET
    ///
    /// In production: TICKET_SECRET must be explicitly set
    /// In development: derived from the JWT secret
    fn load_ticket_secret(is_production: bool, jwt_secret: &str) -> Result<String> {
        match env::var("TICKET_SECRET") {
            Ok(secret) if !secret.is_empty() => Ok(secret),
            _ if is_production => {
                bail!(
                    "TICKET_SECRET environment variable is required in production. \
                     Please set a secret distinct from JWT_SECRET."
                );
            }
            _ => {
                tracing::debug!("TICKET_SECRET not set, deriving it from JWT_SECRET");
                Ok(derive_ticket_secret(jwt_secret))
            }
        }
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}

/// Ticket key derived from the JWT secret, distinct from it
fn derive_ticket_secret(jwt_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"switchboard-ticket:");
    hasher.update(jwt_secret.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("common", &self.common)
            .field("jwt_secret", &"[REDACTED]")
            .field("ticket_secret", &"[REDACTED]")
            .field("ticket_ttl", &self.ticket_ttl)
            .field("auth_timeout", &self.auth_timeout)
            .field("message_auth_enabled", &self.message_auth_enabled)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}
