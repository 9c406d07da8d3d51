//! Normalizes voice provider webhook events into inbound commands.

use serde::Deserialize;
use serde_json::Value;

use crate::application::PayloadParser;
use crate::domain::alert::HangupReason;
use crate::domain::commands::{AmdResult, InboundCommand};
use crate::domain::foundation::DomainError;

/// Extracts the deduplication event id from a raw event payload.
pub fn voice_event_id(payload: &Value) -> Option<String> {
    payload
        .pointer("/data/id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    event_type: String,
    payload: EventPayload,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    call_control_id: String,
    digit: Option<String>,
    hangup_cause: Option<String>,
    result: Option<String>,
}

fn hangup_reason(cause: Option<&str>) -> HangupReason {
    match cause {
        Some("normal_clearing") | Some("originator_cancel") => HangupReason::Completed,
        Some("timeout") | Some("no_answer") => HangupReason::Timeout,
        Some("user_busy") | Some("busy") => HangupReason::Busy,
        Some("call_rejected") => HangupReason::Rejected,
        Some(_) => HangupReason::Failed,
        None => HangupReason::Unknown,
    }
}

/// Payload parser for the voice provider tag.
#[derive(Default)]
pub struct TelnyxEventParser;

impl TelnyxEventParser {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadParser for TelnyxEventParser {
    fn parse(&self, payload: &Value) -> Result<Vec<InboundCommand>, DomainError> {
        let envelope: Envelope = serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::validation("event", e.to_string()))?;

        let call_id = envelope.data.payload.call_control_id;

        let command = match envelope.data.event_type.as_str() {
            "call.initiated" => Some(InboundCommand::VoiceInitiated {
                provider_call_id: call_id,
            }),
            "call.answered" => Some(InboundCommand::VoiceAnswered {
                provider_call_id: call_id,
            }),
            "call.dtmf.received" => envelope
                .data
                .payload
                .digit
                .as_deref()
                .and_then(|d| d.chars().next())
                .map(|digit| InboundCommand::VoiceDigit {
                    provider_call_id: call_id,
                    digit,
                }),
            "call.hangup" => Some(InboundCommand::VoiceHangup {
                provider_call_id: call_id,
                reason: hangup_reason(envelope.data.payload.hangup_cause.as_deref()),
            }),
            "call.machine.detection.ended" => {
                let result = match envelope.data.payload.result.as_deref() {
                    Some("machine") | Some("fax") => AmdResult::Machine,
                    _ => AmdResult::Human,
                };
                Some(InboundCommand::VoiceAmd {
                    provider_call_id: call_id,
                    result,
                })
            }
            other => {
                tracing::debug!(event_type = other, "ignoring voice event type");
                None
            }
        };

        Ok(command.into_iter().collect())
    }
}
