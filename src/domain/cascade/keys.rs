//! Outbox idempotency key construction.
//!
//! A retried cascade step reuses the same key and therefore collapses to a
//! single real provider call. Key shapes:
//!
//! - `chat:{incident}:{audience}:alert` - initial guardian chat alert
//! - `chat:{incident}:{audience}:reminder:{n}` - n-th reminder
//! - `chat:{incident}:{audience}:resolution` - terminal "handled"/"canceled" edit
//! - `chat:{incident}:traveler:acknowledged` - traveler ack notice
//! - `chat:{incident}:traveler:unreachable` - cascade exhaustion notice
//! - `voice:{incident}:{audience}:attempt:{n}` - n-th call placement
//! - `voice:{incident}:hangup:{provider-call-id}` - best-effort hangup

use crate::domain::foundation::{IncidentId, UserId};

pub fn chat_alert_key(incident: IncidentId, audience: UserId) -> String {
    format!("chat:{}:{}:alert", incident, audience)
}

pub fn chat_reminder_key(incident: IncidentId, audience: UserId, n: u32) -> String {
    format!("chat:{}:{}:reminder:{}", incident, audience, n)
}

pub fn chat_resolution_key(incident: IncidentId, audience: UserId) -> String {
    format!("chat:{}:{}:resolution", incident, audience)
}

pub fn chat_traveler_opened_key(incident: IncidentId) -> String {
    format!("chat:{}:traveler:opened", incident)
}

pub fn chat_traveler_ack_key(incident: IncidentId) -> String {
    format!("chat:{}:traveler:acknowledged", incident)
}

pub fn chat_traveler_unreachable_key(incident: IncidentId) -> String {
    format!("chat:{}:traveler:unreachable", incident)
}

pub fn voice_attempt_key(incident: IncidentId, audience: UserId, attempt_no: u32) -> String {
    format!("voice:{}:{}:attempt:{}", incident, audience, attempt_no)
}

pub fn voice_hangup_key(incident: IncidentId, provider_call_id: &str) -> String {
    format!("voice:{}:hangup:{}", incident, provider_call_id)
}
