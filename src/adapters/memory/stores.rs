//! Single in-memory store implementing all store ports.
//!
//! One mutex guards the whole state, which makes multi-entity operations
//! (terminal transition + scheduled-action purge) atomic exactly like
//! their SQL counterparts. The advisory-lock contention path cannot
//! occur here; the mutex serializes instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::alert::{Alert, AlertChannel, CallAttempt};
use crate::domain::foundation::{
    AlertId, CallAttemptId, DomainError, ErrorCode, IncidentId, ScheduledActionId, Timestamp,
    UserId,
};
use crate::domain::guardian::GuardianLink;
use crate::domain::incident::{AckChannel, Incident};
use crate::domain::user::User;
use crate::ports::{
    ActionState, AlertStore, BeginAttempt, CallAttemptStore, GuardianStore, InboxEvent,
    InboxOutcome, InboxStore, IncidentStore, OutboxClaim, OutboxOp, OutboxRecord, OutboxStatus,
    OutboxStore, ScheduledAction, ScheduledActionStore, TerminalOutcome, UserStore,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    links: Vec<GuardianLink>,
    incidents: HashMap<IncidentId, Incident>,
    alerts: HashMap<AlertId, Alert>,
    attempts: HashMap<CallAttemptId, CallAttempt>,
    inbox: HashMap<(String, String), InboxEvent>,
    outbox: HashMap<String, OutboxRecord>,
    actions: HashMap<ScheduledActionId, ScheduledAction>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Test helper: snapshot of all scheduled actions.
    pub fn actions_snapshot(&self) -> Vec<ScheduledAction> {
        self.lock().actions.values().cloned().collect()
    }

    /// Test helper: snapshot of all outbox rows.
    pub fn outbox_snapshot(&self) -> Vec<OutboxRecord> {
        self.lock().outbox.values().cloned().collect()
    }

    /// Test helper: snapshot of all call attempts.
    pub fn attempts_snapshot(&self) -> Vec<CallAttempt> {
        self.lock().attempts.values().cloned().collect()
    }

    fn apply_terminal<F>(
        &self,
        id: IncidentId,
        transition: F,
    ) -> Result<TerminalOutcome, DomainError>
    where
        F: FnOnce(&mut Incident) -> Result<(), DomainError>,
    {
        let mut state = self.lock();

        let Some(incident) = state.incidents.get(&id).cloned() else {
            return Err(DomainError::new(
                ErrorCode::IncidentNotFound,
                format!("Incident not found: {}", id),
            ));
        };

        if incident.is_terminal() {
            return Ok(TerminalOutcome::AlreadyTerminal(incident));
        }

        let mut updated = incident;
        transition(&mut updated)?;
        state.incidents.insert(id, updated.clone());

        for action in state.actions.values_mut() {
            if action.incident_id == id && action.state == ActionState::Scheduled {
                action.state = ActionState::Canceled;
            }
        }

        Ok(TerminalOutcome::Applied(updated))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get(&self, id: UserId) -> Result<Option<User>, DomainError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_by_chat_user_id(&self, chat_user_id: &str) -> Result<Option<User>, DomainError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.chat_user_id.as_deref() == Some(chat_user_id))
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), DomainError> {
        self.lock().users.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl GuardianStore for InMemoryStore {
    async fn active_links_for(&self, traveler: UserId) -> Result<Vec<GuardianLink>, DomainError> {
        let mut links: Vec<_> = self
            .lock()
            .links
            .iter()
            .filter(|l| l.traveler_id == traveler && l.is_active())
            .cloned()
            .collect();
        links.sort_by(|a, b| a.cascade_cmp(b));
        Ok(links)
    }

    async fn find_link(
        &self,
        traveler: UserId,
        watcher: UserId,
    ) -> Result<Option<GuardianLink>, DomainError> {
        Ok(self
            .lock()
            .links
            .iter()
            .find(|l| l.traveler_id == traveler && l.watcher_id == watcher)
            .cloned())
    }

    async fn upsert_link(&self, link: &GuardianLink) -> Result<(), DomainError> {
        let mut state = self.lock();
        state
            .links
            .retain(|l| !(l.traveler_id == link.traveler_id && l.watcher_id == link.watcher_id));
        state.links.push(link.clone());
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for InMemoryStore {
    async fn create(&self, incident: &Incident) -> Result<(), DomainError> {
        self.lock().incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    async fn get(&self, id: IncidentId) -> Result<Option<Incident>, DomainError> {
        Ok(self.lock().incidents.get(&id).cloned())
    }

    async fn acknowledge(
        &self,
        id: IncidentId,
        by: UserId,
        via: AckChannel,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError> {
        self.apply_terminal(id, |incident| incident.acknowledge(by, via, now))
    }

    async fn cancel(
        &self,
        id: IncidentId,
        _by: UserId,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError> {
        self.apply_terminal(id, |incident| incident.cancel(now))
    }
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn insert_if_absent(&self, alert: &Alert) -> Result<Alert, DomainError> {
        let mut state = self.lock();
        let existing = state
            .alerts
            .values()
            .find(|a| {
                a.incident_id == alert.incident_id
                    && a.audience_id == alert.audience_id
                    && a.channel == alert.channel
            })
            .cloned();

        match existing {
            Some(existing) => Ok(existing),
            None => {
                state.alerts.insert(alert.id, alert.clone());
                Ok(alert.clone())
            }
        }
    }

    async fn get(&self, id: AlertId) -> Result<Option<Alert>, DomainError> {
        Ok(self.lock().alerts.get(&id).cloned())
    }

    async fn find(
        &self,
        incident: IncidentId,
        audience: UserId,
        channel: AlertChannel,
    ) -> Result<Option<Alert>, DomainError> {
        Ok(self
            .lock()
            .alerts
            .values()
            .find(|a| {
                a.incident_id == incident && a.audience_id == audience && a.channel == channel
            })
            .cloned())
    }

    async fn list_for_incident(&self, incident: IncidentId) -> Result<Vec<Alert>, DomainError> {
        let mut alerts: Vec<_> = self
            .lock()
            .alerts
            .values()
            .filter(|a| a.incident_id == incident)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    async fn update(&self, alert: &Alert) -> Result<(), DomainError> {
        let mut state = self.lock();
        if !state.alerts.contains_key(&alert.id) {
            return Err(DomainError::new(
                ErrorCode::AlertNotFound,
                format!("Alert not found: {}", alert.id),
            ));
        }
        state.alerts.insert(alert.id, alert.clone());
        Ok(())
    }
}

#[async_trait]
impl CallAttemptStore for InMemoryStore {
    async fn begin(&self, attempt: &CallAttempt) -> Result<BeginAttempt, DomainError> {
        let mut state = self.lock();

        let pending = state
            .attempts
            .values()
            .find(|a| a.alert_id == attempt.alert_id && !a.is_settled())
            .cloned();
        if let Some(pending) = pending {
            return Ok(BeginAttempt::AlreadyPending(pending));
        }

        let same_number = state
            .attempts
            .values()
            .find(|a| a.alert_id == attempt.alert_id && a.attempt_no == attempt.attempt_no)
            .cloned();
        if let Some(existing) = same_number {
            return Ok(BeginAttempt::AlreadyPending(existing));
        }

        state.attempts.insert(attempt.id, attempt.clone());
        Ok(BeginAttempt::Started(attempt.clone()))
    }

    async fn get(&self, id: CallAttemptId) -> Result<Option<CallAttempt>, DomainError> {
        Ok(self.lock().attempts.get(&id).cloned())
    }

    async fn update(&self, attempt: &CallAttempt) -> Result<(), DomainError> {
        let mut state = self.lock();
        if !state.attempts.contains_key(&attempt.id) {
            return Err(DomainError::new(
                ErrorCode::AttemptNotFound,
                format!("Call attempt not found: {}", attempt.id),
            ));
        }
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallAttempt>, DomainError> {
        Ok(self
            .lock()
            .attempts
            .values()
            .find(|a| a.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned())
    }

    async fn list_for_alert(&self, alert: AlertId) -> Result<Vec<CallAttempt>, DomainError> {
        let mut attempts: Vec<_> = self
            .lock()
            .attempts
            .values()
            .filter(|a| a.alert_id == alert)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_no);
        Ok(attempts)
    }

    async fn unsettled_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<CallAttempt>, DomainError> {
        let state = self.lock();
        let alert_ids: Vec<AlertId> = state
            .alerts
            .values()
            .filter(|a| a.incident_id == incident)
            .map(|a| a.id)
            .collect();
        Ok(state
            .attempts
            .values()
            .filter(|a| alert_ids.contains(&a.alert_id) && !a.is_settled())
            .cloned()
            .collect())
    }

    async fn total_ring_secs(&self, alert: AlertId) -> Result<u32, DomainError> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| a.alert_id == alert && a.is_settled())
            .map(|a| a.ring_secs())
            .sum())
    }
}

#[async_trait]
impl InboxStore for InMemoryStore {
    async fn record(
        &self,
        provider: &str,
        event_id: &str,
        payload: &Value,
        now: Timestamp,
    ) -> Result<InboxOutcome, DomainError> {
        let mut state = self.lock();
        let key = (provider.to_string(), event_id.to_string());
        if state.inbox.contains_key(&key) {
            return Ok(InboxOutcome::Duplicate);
        }
        state.inbox.insert(
            key,
            InboxEvent {
                provider: provider.to_string(),
                event_id: event_id.to_string(),
                payload: payload.clone(),
                received_at: now,
                processed_at: None,
            },
        );
        Ok(InboxOutcome::Fresh)
    }

    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let mut state = self.lock();
        let key = (provider.to_string(), event_id.to_string());
        if let Some(event) = state.inbox.get_mut(&key) {
            if event.processed_at.is_none() {
                event.processed_at = Some(at);
            }
        }
        Ok(())
    }

    async fn unprocessed_before(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<InboxEvent>, DomainError> {
        let mut stale: Vec<_> = self
            .lock()
            .inbox
            .values()
            .filter(|e| e.processed_at.is_none() && e.received_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|e| e.received_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn claim_or_get(
        &self,
        key: &str,
        op: &OutboxOp,
        now: Timestamp,
    ) -> Result<OutboxClaim, DomainError> {
        let mut state = self.lock();
        if let Some(existing) = state.outbox.get(key) {
            return Ok(OutboxClaim::Existing(existing.clone()));
        }

        let record = OutboxRecord {
            key: key.to_string(),
            channel: op.channel(),
            op: op.clone(),
            status: OutboxStatus::Pending,
            provider_message_id: None,
            attempts: 0,
            last_error: None,
            created_at: now,
        };
        state.outbox.insert(key.to_string(), record.clone());
        Ok(OutboxClaim::Fresh(record))
    }

    async fn get(&self, key: &str) -> Result<Option<OutboxRecord>, DomainError> {
        Ok(self.lock().outbox.get(key).cloned())
    }

    async fn mark_sent(
        &self,
        key: &str,
        provider_message_id: Option<&str>,
    ) -> Result<(), DomainError> {
        let mut state = self.lock();
        if let Some(record) = state.outbox.get_mut(key) {
            record.status = OutboxStatus::Sent;
            record.provider_message_id = provider_message_id.map(|s| s.to_string());
            record.attempts += 1;
            record.last_error = None;
        }
        Ok(())
    }

    async fn mark_failed(&self, key: &str, error: &str) -> Result<(), DomainError> {
        let mut state = self.lock();
        if let Some(record) = state.outbox.get_mut(key) {
            if record.status != OutboxStatus::Sent {
                record.status = OutboxStatus::Failed;
                record.attempts += 1;
                record.last_error = Some(error.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledActionStore for InMemoryStore {
    async fn schedule(&self, action: &ScheduledAction) -> Result<(), DomainError> {
        self.lock().actions.insert(action.id, action.clone());
        Ok(())
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ScheduledAction>, DomainError> {
        let mut state = self.lock();
        let mut due: Vec<ScheduledActionId> = state
            .actions
            .values()
            .filter(|a| a.state == ActionState::Scheduled && a.run_at <= now)
            .map(|a| a.id)
            .collect();
        due.sort_by_key(|id| state.actions[id].run_at);
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(action) = state.actions.get_mut(&id) {
                action.state = ActionState::Running;
                claimed.push(action.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_done(&self, id: ScheduledActionId) -> Result<(), DomainError> {
        if let Some(action) = self.lock().actions.get_mut(&id) {
            action.state = ActionState::Done;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: ScheduledActionId,
        error: &str,
        attempts: u32,
    ) -> Result<(), DomainError> {
        if let Some(action) = self.lock().actions.get_mut(&id) {
            action.state = ActionState::Failed;
            action.last_error = Some(error.to_string());
            action.attempts = attempts;
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: ScheduledActionId,
        run_at: Timestamp,
        attempts: u32,
        error: &str,
    ) -> Result<(), DomainError> {
        if let Some(action) = self.lock().actions.get_mut(&id) {
            if action.state == ActionState::Running {
                action.state = ActionState::Scheduled;
                action.run_at = run_at;
                action.attempts = attempts;
                action.last_error = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn cancel_for_incident(&self, incident: IncidentId) -> Result<u64, DomainError> {
        let mut state = self.lock();
        let mut flipped = 0;
        for action in state.actions.values_mut() {
            if action.incident_id == incident && action.state == ActionState::Scheduled {
                action.state = ActionState::Canceled;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn count_scheduled_for(&self, incident: IncidentId) -> Result<u64, DomainError> {
        Ok(self
            .lock()
            .actions
            .values()
            .filter(|a| a.incident_id == incident && a.state == ActionState::Scheduled)
            .count() as u64)
    }
}
