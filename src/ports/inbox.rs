//! Inbox deduper port.
//!
//! Records every provider event exactly once, keyed on
//! (provider, event id). The recording transaction is separate from the
//! domain handler's transaction; `processed_at` is set only after the
//! handler commits, and a background sweep retries rows left unprocessed
//! by a crash.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::{DomainError, Timestamp};

/// Outcome of recording a provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
    /// First sighting; the caller proceeds to the domain handler.
    Fresh,
    /// Redelivery; the caller replies success without processing.
    Duplicate,
}

/// A stored provider event.
#[derive(Debug, Clone)]
pub struct InboxEvent {
    pub provider: String,
    pub event_id: String,
    pub payload: Value,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Records the event; a unique violation maps to `Duplicate`, not an
    /// error.
    async fn record(
        &self,
        provider: &str,
        event_id: &str,
        payload: &Value,
        now: Timestamp,
    ) -> Result<InboxOutcome, DomainError>;

    /// Marks the event processed after the domain handler committed.
    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
        at: Timestamp,
    ) -> Result<(), DomainError>;

    /// Rows still unprocessed and received before `cutoff`, oldest first.
    async fn unprocessed_before(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<InboxEvent>, DomainError>;
}
