//! Call-control API implementation of the voice port.
//!
//! Translates the structured instruction list into the provider's call
//! command markup and correlates responses by `call_control_id`.
//!
//! # Limits
//!
//! - 5 s deadline on call placement, 5 s on hangup
//! - at most 8 concurrent outbound requests

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::ports::{CallRequest, ProviderError, VoiceInstruction, VoicePort};

/// Deadline for one API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound concurrency cap towards the voice API.
const MAX_IN_FLIGHT: usize = 8;

/// Voice adapter configuration.
#[derive(Clone)]
pub struct TelnyxConfig {
    api_key: SecretString,
    connection_id: String,
    api_base_url: String,
}

impl TelnyxConfig {
    pub fn new(api_key: SecretString, connection_id: impl Into<String>) -> Self {
        Self {
            api_key,
            connection_id: connection_id.into(),
            api_base_url: "https://api.telnyx.com".to_string(),
        }
    }

    /// Custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

pub struct TelnyxVoiceAdapter {
    config: TelnyxConfig,
    http: reqwest::Client,
    limiter: Semaphore,
}

impl TelnyxVoiceAdapter {
    pub fn new(config: TelnyxConfig) -> Self {
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

    /// Renders the instruction list into provider markup.
    fn render_instructions(instructions: &[VoiceInstruction]) -> Vec<Value> {
        instructions
            .iter()
            .map(|instruction| match instruction {
                VoiceInstruction::Speak { language, text } => json!({
                    "speak": { "language": language, "payload": text }
                }),
                VoiceInstruction::GatherDtmf {
                    max_digits,
                    timeout_secs,
                    finish_on_key,
                } => json!({
                    "gather": {
                        "max_digits": max_digits,
                        "timeout_secs": timeout_secs,
                        "finish_on_key": finish_on_key.map(|c| c.to_string()),
                    }
                }),
                VoiceInstruction::Hangup => json!({ "hangup": {} }),
            })
            .collect()
    }

    async fn post(&self, url: String, body: Value) -> Result<Value, ProviderError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ProviderError::transient("request limiter closed"))?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("voice api: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ProviderError::transient(format!("voice api: HTTP {}", status)));
        }
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::permanent(format!(
                "voice api: HTTP {}: {}",
                status, detail
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("voice api: malformed response: {}", e)))
    }
}

#[async_trait]
impl VoicePort for TelnyxVoiceAdapter {
    async fn place_call(&self, request: &CallRequest) -> Result<String, ProviderError> {
        let body = json!({
            "connection_id": self.config.connection_id,
            "to": request.to.as_str(),
            "webhook_url": request.result_webhook_url,
            "timeout_secs": request.ring_timeout_secs,
            "time_limit_secs": request.max_duration_secs,
            "machine_detection": "detect",
            "instructions": Self::render_instructions(&request.instructions),
        });

        let response = self
            .post(format!("{}/v2/calls", self.config.api_base_url), body)
            .await?;

        response
            .pointer("/data/call_control_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::permanent("place_call: missing call_control_id"))
    }

    async fn hangup(&self, provider_call_id: &str) -> Result<(), ProviderError> {
        self.post(
            format!(
                "{}/v2/calls/{}/actions/hangup",
                self.config.api_base_url, provider_call_id
            ),
            json!({}),
        )
        .await?;
        Ok(())
    }
}
