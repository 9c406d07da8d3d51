//! Provider credentials: chat bot, voice API, admin surface.

use secrecy::{ExposeSecret, SecretString};

use super::error::ValidationError;

/// Chat provider configuration.
#[derive(Clone)]
pub struct ChatProviderConfig {
    /// Bot API token, from `CHAT_BOT_TOKEN`.
    pub bot_token: SecretString,

    /// Shared secret expected in the webhook auth header, from
    /// `CHAT_WEBHOOK_SECRET`.
    pub webhook_secret: SecretString,
}

impl ChatProviderConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bot_token.expose_secret().is_empty() {
            return Err(ValidationError::MissingSecret {
                key: "CHAT_BOT_TOKEN",
            });
        }
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingSecret {
                key: "CHAT_WEBHOOK_SECRET",
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChatProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatProviderConfig")
            .field("bot_token", &"[redacted]")
            .field("webhook_secret", &"[redacted]")
            .finish()
    }
}

/// Voice provider configuration.
#[derive(Clone)]
pub struct VoiceProviderConfig {
    /// API key, from `VOICE_API_KEY`. Also the HMAC secret for webhook
    /// signatures.
    pub api_key: SecretString,

    /// Outbound connection id, from `VOICE_CONNECTION_ID`.
    pub connection_id: String,
}

impl VoiceProviderConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingSecret {
                key: "VOICE_API_KEY",
            });
        }
        if self.connection_id.is_empty() {
            return Err(ValidationError::MissingSecret {
                key: "VOICE_CONNECTION_ID",
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for VoiceProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceProviderConfig")
            .field("api_key", &"[redacted]")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

/// Admin surface configuration.
#[derive(Clone)]
pub struct AdminConfig {
    /// Key expected in the `X-Admin-Key` header, from `ADMIN_KEY`.
    pub admin_key: SecretString,
}

impl AdminConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.admin_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingSecret { key: "ADMIN_KEY" });
        }
        Ok(())
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("admin_key", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bot_token_is_rejected() {
        let config = ChatProviderConfig {
            bot_token: SecretString::new(String::new()),
            webhook_secret: SecretString::new("s".to_string()),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn populated_voice_config_passes() {
        let config = VoiceProviderConfig {
            api_key: SecretString::new("key".to_string()),
            connection_id: "conn-1".to_string(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = AdminConfig {
            admin_key: SecretString::new("super-secret".to_string()),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
    }
}
