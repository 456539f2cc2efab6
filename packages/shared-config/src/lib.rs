//! Shared configuration types for Switchboard services
//!
//! This crate provides common configuration types used by the relay server
//! and any tooling that embeds the sync client, ensuring consistency across
//! the application.

mod error;
mod listen;

pub use error::{ConfigError, ConfigResult};
pub use listen::ListenConfig;

use std::env;

/// Common configuration shared between all services
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Listener address
    pub listen: ListenConfig,

    /// Environment mode (development, staging, production)
    pub environment: Environment,

    /// Log level (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl CommonConfig {
    /// Load common configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            listen: ListenConfig::from_env()?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse()
                .unwrap_or_default(),
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Load a `.env` file from the working directory if one exists
///
/// Returns the path that was loaded. A missing file is not an error.
pub fn load_dotenv() -> Option<std::path::PathBuf> {
    dotenvy::dotenv().ok()
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

/// Parse a boolean flag, accepting `1/0`, `true/false`, `yes/no`, `on/off`
pub fn parse_bool_env(name: &str, default: bool) -> ConfigResult<bool> {
    match env::var(name) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("expected a boolean, got '{}'", other),
            )),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "prod".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "staging".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert_eq!(
            "dev".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!(
            "anything".parse::<Environment>().unwrap(),
            Environment::Development
        );
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(format!("{}", Environment::Production), "production");
        assert_eq!(format!("{}", Environment::Staging), "staging");
        assert_eq!(format!("{}", Environment::Development), "development");
    }

    #[test]
    fn test_parse_env_default_and_invalid() {
        temp_env::with_var("SWITCHBOARD_TEST_NUMBER", None::<&str>, || {
            assert_eq!(parse_env("SWITCHBOARD_TEST_NUMBER", 7u32).unwrap(), 7);
        });
        temp_env::with_var("SWITCHBOARD_TEST_NUMBER", Some("seven"), || {
            let err = parse_env("SWITCHBOARD_TEST_NUMBER", 7u32).unwrap_err();
            assert!(err.to_string().contains("SWITCHBOARD_TEST_NUMBER"));
        });
    }

    #[test]
    fn test_parse_bool_env() {
        temp_env::with_var("SWITCHBOARD_TEST_FLAG", Some("off"), || {
            assert!(!parse_bool_env("SWITCHBOARD_TEST_FLAG", true).unwrap());
        });
        temp_env::with_var("SWITCHBOARD_TEST_FLAG", Some("YES"), || {
            assert!(parse_bool_env("SWITCHBOARD_TEST_FLAG", false).unwrap());
        });
        temp_env::with_var("SWITCHBOARD_TEST_FLAG", Some("maybe"), || {
            assert!(parse_bool_env("SWITCHBOARD_TEST_FLAG", false).is_err());
        });
        temp_env::with_var("SWITCHBOARD_TEST_FLAG", None::<&str>, || {
            assert!(parse_bool_env("SWITCHBOARD_TEST_FLAG", true).unwrap());
        });
    }

    #[test]
    fn test_get_required_env_missing() {
        temp_env::with_var("SWITCHBOARD_TEST_REQUIRED", None::<&str>, || {
            assert!(matches!(
                get_required_env("SWITCHBOARD_TEST_REQUIRED"),
                Err(ConfigError::MissingEnvVar(_))
            ));
        });
    }
}
