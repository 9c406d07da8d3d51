//! Incident store port.
//!
//! Terminal transitions are the contended path of the whole system: two
//! webhook tasks may race to acknowledge the same incident. The store
//! serializes them with a per-incident advisory lock and applies the
//! transition plus the scheduled-action purge in one transaction, so that
//! a terminal incident can never be observed with live scheduled actions.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, IncidentId, Timestamp, UserId};
use crate::domain::incident::{AckChannel, Incident};

/// Result of an acknowledge/cancel operation.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    /// This call performed the transition.
    Applied(Incident),
    /// The incident was already terminal; the stored decision is returned
    /// unchanged.
    AlreadyTerminal(Incident),
    /// The advisory lock could not be acquired within the retry window.
    /// The caller schedules a reconcile action instead of failing.
    Contended,
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create(&self, incident: &Incident) -> Result<(), DomainError>;

    async fn get(&self, id: IncidentId) -> Result<Option<Incident>, DomainError>;

    /// Acknowledges an open incident under the advisory lock.
    ///
    /// In the same transaction, every scheduled action of the incident in
    /// state `scheduled` is canceled.
    async fn acknowledge(
        &self,
        id: IncidentId,
        by: UserId,
        via: AckChannel,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError>;

    /// Cancels an open incident under the advisory lock. Same transaction
    /// semantics as `acknowledge`. Caller enforces that only the traveler
    /// or an admin invokes this.
    async fn cancel(
        &self,
        id: IncidentId,
        by: UserId,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError>;
}
