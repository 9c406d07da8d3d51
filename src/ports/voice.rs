//! Voice provider port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::ProviderError;
use crate::domain::foundation::PhoneNumber;

/// One step of a call script. The adapter translates the ordered list
/// into the provider's markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceInstruction {
    /// Speak synthesized text in the given language.
    Speak { language: String, text: String },
    /// Collect DTMF digits.
    GatherDtmf {
        max_digits: u8,
        timeout_secs: u32,
        finish_on_key: Option<char>,
    },
    /// Terminal action.
    Hangup,
}

/// A call placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub to: PhoneNumber,
    pub instructions: Vec<VoiceInstruction>,
    /// Where the provider reports call lifecycle and DTMF events.
    pub result_webhook_url: String,
    /// How long to ring before giving up.
    pub ring_timeout_secs: u32,
    /// Upper bound on the whole attempt.
    pub max_duration_secs: u32,
}

/// Verbs the core needs from the voice provider.
#[async_trait]
pub trait VoicePort: Send + Sync {
    /// Places an outbound call. Returns the provider call id used to
    /// correlate subsequent webhook events.
    async fn place_call(&self, request: &CallRequest) -> Result<String, ProviderError>;

    /// Ends an in-progress call. Best-effort; calls also end on their own
    /// timeouts.
    async fn hangup(&self, provider_call_id: &str) -> Result<(), ProviderError>;
}
