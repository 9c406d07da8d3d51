//! Telnyx-flavored voice adapter: call-control client, webhook signature
//! verification, and event normalization.

mod client;
mod events;
mod signature;

pub use client::{TelnyxConfig, TelnyxVoiceAdapter};
pub use events::{voice_event_id, TelnyxEventParser};
pub use signature::{VoiceWebhookVerifier, WebhookAuthError};

/// Inbox provider tag for voice events.
pub const PROVIDER_TAG: &str = "telnyx";
