//! Server configuration.

use serde::Deserialize;
use std::net::SocketAddr;

use super::error::ValidationError;

/// Application environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Environment name.
    pub environment: Environment,

    /// Rust log filter directive.
    pub log_level: String,

    /// JSON log formatting; defaults on in production.
    pub log_json: bool,

    /// Externally reachable base URL, used to build provider webhook
    /// callback URLs.
    pub public_base_url: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// Socket address to bind to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ValidationError::InvalidPort)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Voice provider callback URL.
    pub fn voice_webhook_url(&self) -> String {
        format!("{}/webhook/voice", self.public_base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://")
        {
            return Err(ValidationError::InvalidPublicBaseUrl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ServerConfig {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_json: false,
            public_base_url: "https://example.org".to_string(),
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn voice_webhook_url_joins_cleanly() {
        let mut config = base();
        config.public_base_url = "https://example.org/".to_string();
        assert_eq!(config.voice_webhook_url(), "https://example.org/webhook/voice");
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = base();
        config.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let mut config = base();
        config.public_base_url = "example.org".to_string();
        assert_eq!(config.validate(), Err(ValidationError::InvalidPublicBaseUrl));
    }

    #[test]
    fn is_production_checks_environment() {
        let mut config = base();
        assert!(!config.is_production());
        config.environment = Environment::Production;
        assert!(config.is_production());
    }
}
