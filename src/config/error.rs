//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors raised by semantic validation of loaded configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Server port must not be 0")]
    InvalidPort,

    #[error("DATABASE_URL must be a postgres:// or postgresql:// URL")]
    InvalidDatabaseUrl,

    #[error("{key} must not be empty")]
    MissingSecret { key: &'static str },

    #[error("PUBLIC_BASE_URL must be an absolute http(s) URL")]
    InvalidPublicBaseUrl,

    #[error("{key} must be greater than 0")]
    InvalidCascadeSetting { key: &'static str },

    #[error("ALLOWED_E164_NUMBERS entry '{entry}' is not valid E.164")]
    InvalidWhitelistEntry { entry: String },

    #[error("Whitelist enforcement enabled but ALLOWED_E164_NUMBERS is empty")]
    EmptyWhitelist,
}
