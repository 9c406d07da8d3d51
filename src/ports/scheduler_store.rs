//! Durable scheduled-action store port.
//!
//! Web processes enqueue rows; a single runner claims due rows (moving
//! them `scheduled -> running` atomically) and reports the outcome.
//! Cancellation flips rows to `canceled` in the same transaction that
//! makes an incident terminal, so the runner's claim filter never sees
//! them again.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::{DomainError, IncidentId, ScheduledActionId, Timestamp};

/// Scheduled action lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Scheduled,
    Running,
    Done,
    Canceled,
    Failed,
}

/// A durable timed action bound to one incident.
#[derive(Debug, Clone)]
pub struct ScheduledAction {
    pub id: ScheduledActionId,
    pub incident_id: IncidentId,
    /// Key into the handler registry.
    pub action_type: String,
    pub run_at: Timestamp,
    pub state: ActionState,
    pub payload: Value,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ScheduledAction {
    pub fn new(
        incident_id: IncidentId,
        action_type: impl Into<String>,
        run_at: Timestamp,
        payload: Value,
    ) -> Self {
        Self {
            id: ScheduledActionId::new(),
            incident_id,
            action_type: action_type.into(),
            run_at,
            state: ActionState::Scheduled,
            payload,
            attempts: 0,
            last_error: None,
        }
    }
}

#[async_trait]
pub trait ScheduledActionStore: Send + Sync {
    async fn schedule(&self, action: &ScheduledAction) -> Result<(), DomainError>;

    /// Claims up to `limit` due rows, transitioning them to `running`.
    /// Concurrent claimers never receive the same row.
    async fn claim_due(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ScheduledAction>, DomainError>;

    async fn mark_done(&self, id: ScheduledActionId) -> Result<(), DomainError>;

    /// Terminal failure after the retry ceiling.
    async fn mark_failed(
        &self,
        id: ScheduledActionId,
        error: &str,
        attempts: u32,
    ) -> Result<(), DomainError>;

    /// Puts a failed run back to `scheduled` at a later time.
    async fn reschedule(
        &self,
        id: ScheduledActionId,
        run_at: Timestamp,
        attempts: u32,
        error: &str,
    ) -> Result<(), DomainError>;

    /// Cancels every `scheduled` action of an incident. Returns how many
    /// rows were flipped.
    async fn cancel_for_incident(&self, incident: IncidentId) -> Result<u64, DomainError>;

    /// Count of rows still in `scheduled` for an incident. Used by
    /// invariant checks and tests.
    async fn count_scheduled_for(&self, incident: IncidentId) -> Result<u64, DomainError>;
}
