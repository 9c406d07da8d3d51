//! Alert and call-attempt store ports.

use async_trait::async_trait;

use crate::domain::alert::{Alert, AlertChannel, CallAttempt};
use crate::domain::foundation::{AlertId, CallAttemptId, DomainError, IncidentId, UserId};

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Inserts an alert unless one already exists for the same
    /// (incident, audience, channel); returns the stored row either way.
    /// This makes cascade seeding safely re-runnable.
    async fn insert_if_absent(&self, alert: &Alert) -> Result<Alert, DomainError>;

    async fn get(&self, id: AlertId) -> Result<Option<Alert>, DomainError>;

    async fn find(
        &self,
        incident: IncidentId,
        audience: UserId,
        channel: AlertChannel,
    ) -> Result<Option<Alert>, DomainError>;

    async fn list_for_incident(&self, incident: IncidentId) -> Result<Vec<Alert>, DomainError>;

    async fn update(&self, alert: &Alert) -> Result<(), DomainError>;
}

/// Result of starting a call attempt.
#[derive(Debug, Clone)]
pub enum BeginAttempt {
    Started(CallAttempt),
    /// The alert already has an unsettled attempt; the stored one is
    /// returned. Enforced by the store so a redelivered scheduled action
    /// cannot double-dial.
    AlreadyPending(CallAttempt),
}

#[async_trait]
pub trait CallAttemptStore: Send + Sync {
    /// Records a new attempt, unless the alert already has an unsettled
    /// one.
    async fn begin(&self, attempt: &CallAttempt) -> Result<BeginAttempt, DomainError>;

    async fn get(&self, id: CallAttemptId) -> Result<Option<CallAttempt>, DomainError>;

    async fn update(&self, attempt: &CallAttempt) -> Result<(), DomainError>;

    /// Correlates a provider webhook event back to its attempt.
    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallAttempt>, DomainError>;

    async fn list_for_alert(&self, alert: AlertId) -> Result<Vec<CallAttempt>, DomainError>;

    /// Unsettled attempts across all alerts of an incident; used for
    /// best-effort hangups on terminal transitions.
    async fn unsettled_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<CallAttempt>, DomainError>;

    /// Cumulative ring seconds across all settled attempts of an alert.
    async fn total_ring_secs(&self, alert: AlertId) -> Result<u32, DomainError>;
}
