//! Telegram chat adapter: Bot API client and update parsing.

mod client;
mod update;

pub use client::{TelegramChatAdapter, TelegramConfig};
pub use update::{update_event_id, TelegramUpdateParser};

/// Inbox provider tag for chat events.
pub const PROVIDER_TAG: &str = "telegram";
