//! Outbox port: idempotent record of every outbound provider action.
//!
//! Callers claim a key before invoking the provider; a retried step finds
//! the existing row and collapses to at most one real provider call. The
//! first write wins: a claim with a different payload under an existing
//! key returns the stored payload untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::chat::InlineButton;
use super::voice::CallRequest;
use crate::domain::alert::AlertChannel;
use crate::domain::foundation::{DomainError, Timestamp};

/// Delivery status of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

/// The provider action an outbox row asks for. Fixed-shape, serialized
/// into the row's payload column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboxOp {
    SendChatMessage {
        chat_id: String,
        text: String,
        buttons: Vec<InlineButton>,
    },
    /// Edits the message that was sent under `original_key`; the dispatcher
    /// resolves the provider message id from that row.
    EditChatMessage {
        chat_id: String,
        original_key: String,
        text: String,
        buttons: Vec<InlineButton>,
    },
    PlaceCall {
        request: CallRequest,
    },
    HangupCall {
        provider_call_id: String,
    },
}

impl OutboxOp {
    pub fn channel(&self) -> AlertChannel {
        match self {
            OutboxOp::SendChatMessage { .. } | OutboxOp::EditChatMessage { .. } => {
                AlertChannel::Chat
            }
            OutboxOp::PlaceCall { .. } | OutboxOp::HangupCall { .. } => AlertChannel::Voice,
        }
    }
}

/// A stored outbox row.
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub key: String,
    pub channel: AlertChannel,
    pub op: OutboxOp,
    pub status: OutboxStatus,
    pub provider_message_id: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
}

/// Result of claiming a key.
#[derive(Debug, Clone)]
pub enum OutboxClaim {
    /// The key was inserted now; the caller must invoke the provider.
    Fresh(OutboxRecord),
    /// The key already existed. The caller inspects `status`: `Sent`
    /// short-circuits, `Pending`/`Failed` may be re-driven.
    Existing(OutboxRecord),
}

impl OutboxClaim {
    pub fn record(&self) -> &OutboxRecord {
        match self {
            OutboxClaim::Fresh(r) | OutboxClaim::Existing(r) => r,
        }
    }
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts (key, op, pending) or returns the existing row on a unique
    /// violation. First write wins.
    async fn claim_or_get(
        &self,
        key: &str,
        op: &OutboxOp,
        now: Timestamp,
    ) -> Result<OutboxClaim, DomainError>;

    async fn get(&self, key: &str) -> Result<Option<OutboxRecord>, DomainError>;

    async fn mark_sent(
        &self,
        key: &str,
        provider_message_id: Option<&str>,
    ) -> Result<(), DomainError>;

    async fn mark_failed(&self, key: &str, error: &str) -> Result<(), DomainError>;
}
