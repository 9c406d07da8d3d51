//! Closed set of inbound commands parsed from provider callbacks, and the
//! compact callback-data codec carried by chat inline buttons.

use serde::{Deserialize, Serialize};

use super::alert::HangupReason;
use super::foundation::{IncidentId, ValidationError};

/// Maximum size of an encoded callback-data string, bounded by the chat
/// provider.
pub const CALLBACK_DATA_MAX_BYTES: usize = 64;

const CALLBACK_VERSION: &str = "v1";

/// Action encoded in an inline button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackAction {
    Ack,
    Cancel,
}

impl CallbackAction {
    fn as_str(&self) -> &'static str {
        match self {
            CallbackAction::Ack => "ack",
            CallbackAction::Cancel => "cancel",
        }
    }
}

/// Payload of a chat inline button: `v1|ack|{incident-id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackData {
    pub action: CallbackAction,
    pub incident_id: IncidentId,
}

impl CallbackData {
    pub fn ack(incident_id: IncidentId) -> Self {
        Self {
            action: CallbackAction::Ack,
            incident_id,
        }
    }

    pub fn cancel(incident_id: IncidentId) -> Self {
        Self {
            action: CallbackAction::Cancel,
            incident_id,
        }
    }

    /// Encodes to the wire string. Always within the 64-byte bound.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}",
            CALLBACK_VERSION,
            self.action.as_str(),
            self.incident_id
        )
    }

    /// Parses a wire string.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFormat` for oversized input, an
    /// unknown version or action, or a malformed incident id.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() > CALLBACK_DATA_MAX_BYTES {
            return Err(ValidationError::invalid_format(
                "callback_data",
                "exceeds 64 bytes",
            ));
        }

        let mut parts = raw.splitn(3, '|');
        let version = parts.next().unwrap_or_default();
        let action = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();

        if version != CALLBACK_VERSION {
            return Err(ValidationError::invalid_format(
                "callback_data",
                format!("unknown version '{}'", version),
            ));
        }

        let action = match action {
            "ack" => CallbackAction::Ack,
            "cancel" => CallbackAction::Cancel,
            other => {
                return Err(ValidationError::invalid_format(
                    "callback_data",
                    format!("unknown action '{}'", other),
                ))
            }
        };

        let incident_id = id.parse::<IncidentId>().map_err(|_| {
            ValidationError::invalid_format("callback_data", "malformed incident id")
        })?;

        Ok(Self {
            action,
            incident_id,
        })
    }
}

/// Automatic machine detection verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmdResult {
    Human,
    Machine,
}

/// Every event the core reacts to, normalized from both providers.
///
/// Chat callbacks identify the acting user by their chat-provider id;
/// voice events identify the call by the provider call id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    /// Traveler raised a panic from the chat client.
    ChatPanic {
        by_chat_user: String,
    },
    /// Guardian pressed the acknowledgment button.
    ChatAck {
        incident_id: IncidentId,
        by_chat_user: String,
        callback_id: String,
    },
    /// Traveler pressed the cancel button.
    ChatCancel {
        incident_id: IncidentId,
        by_chat_user: String,
        callback_id: String,
    },
    VoiceInitiated {
        provider_call_id: String,
    },
    VoiceAnswered {
        provider_call_id: String,
    },
    VoiceDigit {
        provider_call_id: String,
        digit: char,
    },
    VoiceHangup {
        provider_call_id: String,
        reason: HangupReason,
    },
    VoiceAmd {
        provider_call_id: String,
        result: AmdResult,
    },
}
