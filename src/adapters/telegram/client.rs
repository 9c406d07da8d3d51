//! Telegram Bot API implementation of the chat port.
//!
//! # Limits
//!
//! - 10 s deadline per API call
//! - at most 8 concurrent outbound requests

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::ports::{ChatPort, InlineButton, ProviderError};

/// Deadline for one Bot API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound concurrency cap towards the Bot API.
const MAX_IN_FLIGHT: usize = 8;

/// Telegram adapter configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    bot_token: SecretString,
    api_base_url: String,
}

impl TelegramConfig {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            api_base_url: "https://api.telegram.org".to_string(),
        }
    }

    /// Custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Subset of the Bot API response envelope the adapter needs.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    result: Option<serde_json::Value>,
}

pub struct TelegramChatAdapter {
    config: TelegramConfig,
    http: reqwest::Client,
    limiter: Semaphore,
}

impl TelegramChatAdapter {
    pub fn new(config: TelegramConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            http,
            limiter: Semaphore::new(MAX_IN_FLIGHT),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base_url,
            self.config.bot_token.expose_secret(),
            method
        )
    }

    /// Calls one Bot API method and returns the `result` value.
    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ProviderError::transient("request limiter closed"))?;

        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ProviderError::transient(format!("telegram {}: {}", method, e))
                } else {
                    ProviderError::transient(format!("telegram {}: request failed: {}", method, e))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ProviderError::transient(format!(
                "telegram {}: HTTP {}",
                method, status
            )));
        }

        let api: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::transient(format!("telegram {}: malformed response: {}", method, e))
        })?;

        if !api.ok {
            // ok=false with a 4xx-class error is a request we should not
            // repeat (bad chat id, blocked bot, message too old to edit).
            return Err(ProviderError::permanent(format!(
                "telegram {}: {}",
                method,
                api.description.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        Ok(api.result.unwrap_or(serde_json::Value::Null))
    }

    fn reply_markup(buttons: &[InlineButton]) -> serde_json::Value {
        let row: Vec<_> = buttons
            .iter()
            .map(|b| json!({ "text": b.text, "callback_data": b.callback_data }))
            .collect();
        json!({ "inline_keyboard": [row] })
    }
}

#[async_trait]
impl ChatPort for TelegramChatAdapter {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<String, ProviderError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if !buttons.is_empty() {
            body["reply_markup"] = Self::reply_markup(buttons);
        }

        let result = self.call("sendMessage", body).await?;
        let message_id = result
            .get("message_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ProviderError::permanent("sendMessage: missing message_id"))?;

        Ok(message_id.to_string())
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<(), ProviderError> {
        let message_id: i64 = message_id
            .parse()
            .map_err(|_| ProviderError::permanent("editMessageText: non-numeric message id"))?;

        let mut body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if !buttons.is_empty() {
            body["reply_markup"] = Self::reply_markup(buttons);
        }

        self.call("editMessageText", body).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), ProviderError> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id, "text": text }),
        )
        .await?;
        Ok(())
    }
}
