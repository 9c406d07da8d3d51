//! Outbox dispatcher: the only path through which the core talks to
//! providers.
//!
//! `send` records the intent under an idempotency key, invokes the
//! provider port, and records the outcome. A key that was already sent
//! returns the stored provider message id without a new provider call,
//! which is what makes retried cascade steps collapse to one real send.
//!
//! Provider I/O happens outside any database transaction or incident
//! lock; the outbox row is the durable record of what was asked.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{ChatPort, OutboxOp, OutboxStatus, OutboxStore, VoicePort};

/// Result of an idempotent send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Provider message id (chat) or call id (voice), when the operation
    /// yields one.
    pub provider_message_id: Option<String>,
    /// True when a prior send already succeeded and no provider call was
    /// made now.
    pub already_sent: bool,
}

pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxStore>,
    chat: Arc<dyn ChatPort>,
    voice: Arc<dyn VoicePort>,
}

impl OutboxDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        chat: Arc<dyn ChatPort>,
        voice: Arc<dyn VoicePort>,
    ) -> Self {
        Self { outbox, chat, voice }
    }

    /// Sends `op` under `key`, at most once.
    ///
    /// # Errors
    ///
    /// `ProviderTransient` when the provider call failed retryably (the
    /// row is marked failed and a later call with the same key re-drives
    /// it); `ProviderPermanent` when retrying cannot help.
    pub async fn send(
        &self,
        key: &str,
        op: OutboxOp,
        now: Timestamp,
    ) -> Result<SendOutcome, DomainError> {
        let claim = self.outbox.claim_or_get(key, &op, now).await?;
        let record = claim.record().clone();

        if record.status == OutboxStatus::Sent {
            tracing::debug!(key, "outbox key already sent, collapsing");
            return Ok(SendOutcome {
                provider_message_id: record.provider_message_id,
                already_sent: true,
            });
        }

        // Drive the STORED op: first write wins, later payloads under the
        // same key are ignored.
        self.invoke(key, &record.op).await
    }

    /// Re-drives an existing key, e.g. from a retry action. A key that
    /// was never claimed is an error.
    pub async fn redrive(&self, key: &str) -> Result<SendOutcome, DomainError> {
        let record = self.outbox.get(key).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::OutboxKeyNotFound,
                format!("No outbox row for key {}", key),
            )
        })?;

        if record.status == OutboxStatus::Sent {
            return Ok(SendOutcome {
                provider_message_id: record.provider_message_id,
                already_sent: true,
            });
        }

        self.invoke(key, &record.op).await
    }

    async fn invoke(&self, key: &str, op: &OutboxOp) -> Result<SendOutcome, DomainError> {
        let result = match op {
            OutboxOp::SendChatMessage {
                chat_id,
                text,
                buttons,
            } => self
                .chat
                .send_message(chat_id, text, buttons)
                .await
                .map(Some),

            OutboxOp::EditChatMessage {
                chat_id,
                original_key,
                text,
                buttons,
            } => {
                let original = self.outbox.get(original_key).await?;
                let message_id = original.and_then(|r| r.provider_message_id);
                match message_id {
                    Some(mid) => self
                        .chat
                        .edit_message(chat_id, &mid, text, buttons)
                        .await
                        .map(|_| None),
                    None => {
                        // The original message never reached the provider;
                        // there is nothing to edit.
                        let err = format!("original message {} was never sent", original_key);
                        self.outbox.mark_failed(key, &err).await?;
                        return Err(DomainError::new(ErrorCode::ProviderPermanent, err));
                    }
                }
            }

            OutboxOp::PlaceCall { request } => self.voice.place_call(request).await.map(Some),

            OutboxOp::HangupCall { provider_call_id } => {
                self.voice.hangup(provider_call_id).await.map(|_| None)
            }
        };

        match result {
            Ok(provider_message_id) => {
                self.outbox
                    .mark_sent(key, provider_message_id.as_deref())
                    .await?;
                Ok(SendOutcome {
                    provider_message_id,
                    already_sent: false,
                })
            }
            Err(provider_err) => {
                metrics::counter!(
                    "outbox_send_failures_total",
                    "channel" => op.channel().as_str()
                )
                .increment(1);
                tracing::warn!(key, error = %provider_err, "provider call failed");
                self.outbox
                    .mark_failed(key, &provider_err.message)
                    .await?;
                Err(provider_err.into())
            }
        }
    }
}
