//! Incident service: opening, acknowledgment, and cancellation.
//!
//! Terminal transitions run in two phases. Phase one is the store
//! operation: advisory lock, status flip, scheduled-action purge, all in
//! one transaction. Phase two is provider fan-out through the outbox
//! (resolution edits, traveler notice, best-effort hangups), which runs
//! outside the lock and tolerates partial failure: a failed edit surfaces
//! via metrics but never re-opens the incident.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::alert::AlertChannel;
use crate::domain::cascade::{
    chat_alert_key, chat_resolution_key, chat_traveler_ack_key, texts, voice_hangup_key, Language,
};
use crate::domain::foundation::{DomainError, ErrorCode, IncidentId, Timestamp, UserId};
use crate::domain::incident::{AckChannel, Incident};
use crate::ports::{
    AlertStore, CallAttemptStore, IncidentStore, OutboxOp, ScheduledAction, ScheduledActionStore,
    TerminalOutcome, UserStore,
};

use super::outbox_dispatcher::OutboxDispatcher;
use super::scheduler::{action_types, ActionHandler};

/// Delay before a contended terminal transition is reconciled.
const RECONCILE_DELAY_SECS: u32 = 1;

/// Payload of a `reconcile_ack` scheduled action.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileAckPayload {
    pub by: UserId,
    pub via: AckChannel,
}

pub struct IncidentService {
    incidents: Arc<dyn IncidentStore>,
    alerts: Arc<dyn AlertStore>,
    attempts: Arc<dyn CallAttemptStore>,
    actions: Arc<dyn ScheduledActionStore>,
    users: Arc<dyn UserStore>,
    dispatcher: Arc<OutboxDispatcher>,
    language: Language,
}

impl IncidentService {
    pub fn new(
        incidents: Arc<dyn IncidentStore>,
        alerts: Arc<dyn AlertStore>,
        attempts: Arc<dyn CallAttemptStore>,
        actions: Arc<dyn ScheduledActionStore>,
        users: Arc<dyn UserStore>,
        dispatcher: Arc<OutboxDispatcher>,
        language: Language,
    ) -> Self {
        Self {
            incidents,
            alerts,
            attempts,
            actions,
            users,
            dispatcher,
            language,
        }
    }

    /// Opens an incident for a traveler.
    pub async fn open(&self, traveler_id: UserId, now: Timestamp) -> Result<Incident, DomainError> {
        let traveler = self.users.get(traveler_id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::UserNotFound,
                format!("Unknown traveler {}", traveler_id),
            )
        })?;

        let incident = Incident::open(traveler.id, now);
        self.incidents.create(&incident).await?;

        metrics::counter!("incidents_opened_total").increment(1);
        tracing::info!(incident_id = %incident.id, traveler_id = %traveler_id, "incident opened");

        Ok(incident)
    }

    /// Acknowledges an incident on behalf of a guardian.
    ///
    /// Idempotent once terminal: a second call returns the stored decision
    /// and performs no fan-out. A lock-contended call schedules a
    /// reconcile action and reports `Contended`.
    pub async fn acknowledge(
        &self,
        incident_id: IncidentId,
        by: UserId,
        via: AckChannel,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError> {
        let outcome = self.incidents.acknowledge(incident_id, by, via, now).await?;

        match &outcome {
            TerminalOutcome::Applied(incident) => {
                metrics::counter!("incident_acknowledged_total").increment(1);
                tracing::info!(
                    incident_id = %incident_id,
                    by = %by,
                    via = ?via,
                    "incident acknowledged"
                );
                self.fan_out_acknowledged(incident, by, now).await;
            }
            TerminalOutcome::AlreadyTerminal(incident) => {
                tracing::debug!(
                    incident_id = %incident_id,
                    status = ?incident.status,
                    "acknowledge on terminal incident is a no-op"
                );
            }
            TerminalOutcome::Contended => {
                self.schedule_reconcile(incident_id, by, via, now).await?;
            }
        }

        Ok(outcome)
    }

    /// Cancels an incident. Only the traveler, or an admin override, may
    /// cancel.
    pub async fn cancel(
        &self,
        incident_id: IncidentId,
        by: UserId,
        admin_override: bool,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError> {
        let incident = self.incidents.get(incident_id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::IncidentNotFound,
                format!("Unknown incident {}", incident_id),
            )
        })?;

        if !admin_override && incident.traveler_id != by {
            return Err(DomainError::new(
                ErrorCode::Forbidden,
                "Only the traveler may cancel an incident",
            ));
        }

        let outcome = self.incidents.cancel(incident_id, by, now).await?;

        match &outcome {
            TerminalOutcome::Applied(incident) => {
                metrics::counter!("incident_canceled_total").increment(1);
                tracing::info!(incident_id = %incident_id, "incident canceled by traveler");
                self.fan_out_canceled(incident, now).await;
            }
            TerminalOutcome::AlreadyTerminal(_) => {}
            TerminalOutcome::Contended => {
                // Cancellation contended against an acknowledgment; whoever
                // wins, the incident goes terminal. No reconcile needed for
                // the losing cancel.
                tracing::warn!(incident_id = %incident_id, "cancel contended, dropping");
            }
        }

        Ok(outcome)
    }

    async fn schedule_reconcile(
        &self,
        incident_id: IncidentId,
        by: UserId,
        via: AckChannel,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let payload = serde_json::to_value(ReconcileAckPayload { by, via })
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        let action = ScheduledAction::new(
            incident_id,
            action_types::RECONCILE_ACK,
            now.plus_secs(RECONCILE_DELAY_SECS),
            payload,
        );
        self.actions.schedule(&action).await?;

        metrics::counter!("incident_ack_contended_total").increment(1);
        tracing::warn!(incident_id = %incident_id, "acknowledge contended, reconcile scheduled");
        Ok(())
    }

    /// Terminal fan-out after an acknowledgment: resolution edits to every
    /// chat-alerted guardian, a notice to the traveler, and best-effort
    /// hangups of unsettled calls.
    async fn fan_out_acknowledged(&self, incident: &Incident, by: UserId, now: Timestamp) {
        let guardian_name = self.display_name(by).await;
        let handled = texts::chat_handled(self.language, &guardian_name);

        self.edit_guardian_alerts(incident, &handled, now).await;

        // Traveler notice.
        if let Ok(Some(traveler)) = self.users.get(incident.traveler_id).await {
            if let Some(chat_id) = traveler.chat_user_id {
                let op = OutboxOp::SendChatMessage {
                    chat_id,
                    text: texts::traveler_acknowledged(self.language, &guardian_name),
                    buttons: vec![],
                };
                self.send_logged(&chat_traveler_ack_key(incident.id), op, now)
                    .await;
            }
        }

        self.hangup_unsettled(incident.id, now).await;
    }

    async fn fan_out_canceled(&self, incident: &Incident, now: Timestamp) {
        let traveler_name = self.display_name(incident.traveler_id).await;
        let canceled = texts::chat_canceled(self.language, &traveler_name);

        self.edit_guardian_alerts(incident, &canceled, now).await;
        self.hangup_unsettled(incident.id, now).await;
    }

    /// Rewrites each guardian's original alert message with the terminal
    /// text and strips the buttons.
    async fn edit_guardian_alerts(&self, incident: &Incident, text: &str, now: Timestamp) {
        let alerts = match self.alerts.list_for_incident(incident.id).await {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::error!(incident_id = %incident.id, error = %e, "failed to list alerts");
                return;
            }
        };

        for alert in alerts.iter().filter(|a| a.channel == AlertChannel::Chat) {
            let chat_id = match self.users.get(alert.audience_id).await {
                Ok(Some(user)) => match user.chat_user_id {
                    Some(id) => id,
                    None => continue,
                },
                _ => continue,
            };

            let op = OutboxOp::EditChatMessage {
                chat_id,
                original_key: chat_alert_key(incident.id, alert.audience_id),
                text: text.to_string(),
                buttons: vec![],
            };
            self.send_logged(&chat_resolution_key(incident.id, alert.audience_id), op, now)
                .await;
        }
    }

    /// Hangs up every unsettled call of the incident. Failures are
    /// swallowed: the calls time out on their own.
    async fn hangup_unsettled(&self, incident_id: IncidentId, now: Timestamp) {
        let unsettled = match self.attempts.unsettled_for_incident(incident_id).await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::error!(incident_id = %incident_id, error = %e, "failed to list unsettled attempts");
                return;
            }
        };

        for attempt in unsettled {
            let Some(call_id) = attempt.provider_call_id else {
                continue;
            };
            let key = voice_hangup_key(incident_id, &call_id);
            let op = OutboxOp::HangupCall {
                provider_call_id: call_id,
            };
            if let Err(e) = self.dispatcher.send(&key, op, now).await {
                tracing::debug!(incident_id = %incident_id, error = %e, "hangup failed, relying on natural timeout");
            }
        }
    }

    async fn send_logged(&self, key: &str, op: OutboxOp, now: Timestamp) {
        if let Err(e) = self.dispatcher.send(key, op, now).await {
            tracing::warn!(key, error = %e, "terminal fan-out send failed");
        }
    }

    async fn display_name(&self, id: UserId) -> String {
        match self.users.get(id).await {
            Ok(Some(user)) => user.display_name,
            _ => "guardian".to_string(),
        }
    }
}

/// Re-runs an acknowledgment that lost the advisory lock race.
pub struct ReconcileAckHandler {
    service: Arc<IncidentService>,
}

impl ReconcileAckHandler {
    pub fn new(service: Arc<IncidentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ActionHandler for ReconcileAckHandler {
    async fn run(&self, action: &ScheduledAction, now: Timestamp) -> Result<(), DomainError> {
        let payload: ReconcileAckPayload = serde_json::from_value(action.payload.clone())
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        // A Contended outcome already scheduled a fresh reconcile action,
        // so this run is complete either way.
        self.service
            .acknowledge(action.incident_id, payload.by, payload.via, now)
            .await?;
        Ok(())
    }
}
