//! Application configuration.
//!
//! Loaded from flat environment variables (a `.env` file is honored in
//! development) using the `config` and `dotenvy` crates, then grouped
//! into typed sections with semantic validation per section.
//!
//! # Recognized keys
//!
//! `DATABASE_URL`, `CHAT_BOT_TOKEN`, `CHAT_WEBHOOK_SECRET`,
//! `VOICE_API_KEY`, `VOICE_CONNECTION_ID`, `ADMIN_KEY`, `APP_ENV`,
//! `FEATURE_PANIC`, `SCHEDULER_ENABLED`, `DEFAULT_RING_TIMEOUT_SEC`,
//! `DEFAULT_MAX_RETRIES`, `DEFAULT_RETRY_BACKOFF_SEC`,
//! `DEFAULT_REMINDER_INTERVAL_SEC`, `INCIDENT_MAX_TOTAL_RING_SEC`,
//! `ALLOWED_E164_NUMBERS`, `FEATURE_ALLOW_ONLY_WHITELIST`, plus server
//! keys `HOST`, `PORT`, `PUBLIC_BASE_URL`, `LOG_LEVEL`, `LOG_JSON`.

mod cascade;
mod database;
mod error;
mod features;
mod providers;
mod server;

pub use cascade::CascadeConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use features::{parse_csv_numbers, FeatureFlags};
pub use providers::{AdminConfig, ChatProviderConfig, VoiceProviderConfig};
pub use server::{Environment, ServerConfig};

use secrecy::SecretString;
use serde::Deserialize;

/// The raw flat shape the environment deserializes into.
#[derive(Debug, Deserialize)]
struct RawSettings {
    database_url: String,
    chat_bot_token: String,
    chat_webhook_secret: String,
    voice_api_key: String,
    voice_connection_id: String,
    admin_key: String,

    #[serde(default)]
    app_env: Environment,

    #[serde(default = "default_true")]
    feature_panic: bool,
    #[serde(default = "default_true")]
    scheduler_enabled: bool,
    #[serde(default)]
    feature_allow_only_whitelist: bool,
    #[serde(default)]
    allowed_e164_numbers: Option<String>,

    #[serde(default = "default_ring_timeout")]
    default_ring_timeout_sec: u32,
    #[serde(default = "default_max_retries")]
    default_max_retries: u32,
    #[serde(default = "default_retry_backoff")]
    default_retry_backoff_sec: u32,
    #[serde(default = "default_reminder_interval")]
    default_reminder_interval_sec: u32,
    #[serde(default = "default_max_total_ring")]
    incident_max_total_ring_sec: u32,

    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_public_base_url")]
    public_base_url: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_json: Option<bool>,
    #[serde(default = "default_request_timeout")]
    request_timeout_secs: u64,
    #[serde(default = "default_db_max_connections")]
    db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout")]
    db_acquire_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_ring_timeout() -> u32 {
    25
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u32 {
    60
}
fn default_reminder_interval() -> u32 {
    120
}
fn default_max_total_ring() -> u32 {
    180
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_log_level() -> String {
    "info,protectogram=debug,sqlx=warn".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_acquire_timeout() -> u64 {
    5
}

/// Root application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chat: ChatProviderConfig,
    pub voice: VoiceProviderConfig,
    pub admin: AdminConfig,
    pub cascade: CascadeConfig,
    pub features: FeatureFlags,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when required variables are missing or
    /// values cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env if present (development).
        dotenvy::dotenv().ok();

        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawSettings) -> Self {
        let environment = raw.app_env;
        Self {
            server: ServerConfig {
                host: raw.host,
                port: raw.port,
                environment,
                log_level: raw.log_level,
                log_json: raw
                    .log_json
                    .unwrap_or(environment == Environment::Production),
                public_base_url: raw.public_base_url,
                request_timeout_secs: raw.request_timeout_secs,
            },
            database: DatabaseConfig {
                url: raw.database_url,
                max_connections: raw.db_max_connections,
                acquire_timeout_secs: raw.db_acquire_timeout_secs,
            },
            chat: ChatProviderConfig {
                bot_token: SecretString::new(raw.chat_bot_token),
                webhook_secret: SecretString::new(raw.chat_webhook_secret),
            },
            voice: VoiceProviderConfig {
                api_key: SecretString::new(raw.voice_api_key),
                connection_id: raw.voice_connection_id,
            },
            admin: AdminConfig {
                admin_key: SecretString::new(raw.admin_key),
            },
            cascade: CascadeConfig {
                default_ring_timeout_sec: raw.default_ring_timeout_sec,
                default_max_retries: raw.default_max_retries,
                default_retry_backoff_sec: raw.default_retry_backoff_sec,
                default_reminder_interval_sec: raw.default_reminder_interval_sec,
                incident_max_total_ring_sec: raw.incident_max_total_ring_sec,
            },
            features: FeatureFlags {
                panic_enabled: raw.feature_panic,
                scheduler_enabled: raw.scheduler_enabled,
                allow_only_whitelist: raw.feature_allow_only_whitelist,
                allowed_e164_numbers: raw
                    .allowed_e164_numbers
                    .as_deref()
                    .map(parse_csv_numbers)
                    .unwrap_or_default(),
            },
        }
    }

    /// Validates all sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.chat.validate()?;
        self.voice.validate()?;
        self.admin.validate()?;
        self.cascade.validate()?;
        self.features.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
