//! Chat provider port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::ProviderError;

/// One inline button under a chat message. `callback_data` is an opaque,
/// size-bounded string the domain decodes back into an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Verbs the core needs from the chat provider.
///
/// Implementations carry their own outbound deadline (10 s) and
/// concurrency cap; callers treat every method as a suspension point and
/// never invoke them while holding the incident lock.
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Sends a message, optionally with inline buttons.
    ///
    /// Returns the provider message id, needed for later edits.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<String, ProviderError>;

    /// Edits an existing message in place (text and buttons).
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<(), ProviderError>;

    /// Answers a callback query with a short toast. Best-effort; the UI
    /// degrades gracefully when this fails.
    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), ProviderError>;
}
