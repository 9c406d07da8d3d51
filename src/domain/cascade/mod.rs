//! Cascade policy: who is contacted next, when, and how.
//!
//! Everything in this module is pure; the application layer feeds it
//! guardian links and attempt history and persists whatever it decides.

mod keys;
mod policy;
mod prompt;

pub use keys::{
    chat_alert_key, chat_reminder_key, chat_resolution_key, chat_traveler_ack_key,
    chat_traveler_opened_key, chat_traveler_unreachable_key, voice_attempt_key, voice_hangup_key,
};
pub use policy::{
    next_call_attempt, seed_targets, stagger_first_call, CascadeDefaults, RetryDecision,
    WhitelistPolicy,
};
pub use prompt::{texts, Language};
