//! Server configuration module.
//!
//! Parses configuration from environment variables for the EventPlat server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `EVENTPLAT_JWT_SECRET` | Yes* | - | Shared secret session tokens are signed with |
//! | `EVENTPLAT_NOTIFIER_TOKEN` | Yes* | - | Bearer token the CRUD layer presents on `POST /events` |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `EVENTPLAT_UNSAFE_NO_AUTH` | No | false | Disable all authentication (dev only) |
//!
//! *Not required if `EVENTPLAT_UNSAFE_NO_AUTH=true`

use std::env;

use thiserror::Error;
use tracing::warn;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat {
        /// The offending environment variable.
        var: String,
        /// Why its value was rejected.
        message: String,
    },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for verifying session tokens.
    pub jwt_secret: Option<String>,

    /// Bearer token for the event-ingestion endpoint.
    pub notifier_token: Option<String>,

    /// HTTP server port.
    pub port: u16,

    /// When true, disables all authentication (development only).
    pub unsafe_no_auth: bool,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing (when
    /// `EVENTPLAT_UNSAFE_NO_AUTH` is not true) or have invalid values.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use eventplat_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let unsafe_no_auth = parse_bool_env("EVENTPLAT_UNSAFE_NO_AUTH");
        let port = parse_port()?;
        let jwt_secret = non_empty_env("EVENTPLAT_JWT_SECRET");
        let notifier_token = non_empty_env("EVENTPLAT_NOTIFIER_TOKEN");

        let config = Self {
            jwt_secret,
            notifier_token,
            port,
            unsafe_no_auth,
        };

        config.validate()?;

        if config.unsafe_no_auth {
            warn!(
                "EVENTPLAT_UNSAFE_NO_AUTH is enabled - all authentication is disabled. \
                 Do not use in production!"
            );
        }

        Ok(config)
    }

    /// Ensures either unsafe mode is on or both secrets are configured.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.unsafe_no_auth {
            return Ok(());
        }

        if self.jwt_secret.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "EVENTPLAT_JWT_SECRET".to_string(),
            ));
        }

        if self.notifier_token.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "EVENTPLAT_NOTIFIER_TOKEN".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reads an environment variable, treating empty values as unset.
fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the variable is set to "true" (case-insensitive),
/// `false` otherwise.
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}
