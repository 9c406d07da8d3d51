//! Cascade engine: seeds alerts for a new incident, sequences voice call
//! attempts, fires chat reminders, and routes inbound commands from both
//! providers into the incident state machine.
//!
//! Every step is guarded by the incident state at entry, so redelivered
//! webhooks and at-least-once scheduled actions degrade to no-ops once
//! the incident is terminal.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::alert::{Alert, AlertChannel, AlertStatus, CallAttempt, CallResult};
use crate::domain::cascade::{
    chat_alert_key, chat_reminder_key, chat_traveler_opened_key, chat_traveler_unreachable_key,
    next_call_attempt, seed_targets, stagger_first_call, texts, voice_attempt_key,
    voice_hangup_key, CascadeDefaults, Language, RetryDecision, WhitelistPolicy,
};
use crate::domain::commands::{AmdResult, CallbackData, InboundCommand};
use crate::domain::foundation::{AlertId, DomainError, ErrorCode, IncidentId, Timestamp, UserId};
use crate::domain::incident::{AckChannel, Incident};
use crate::domain::user::User;
use crate::ports::{
    AlertStore, BeginAttempt, CallAttemptStore, CallRequest, ChatPort, GuardianStore,
    IncidentStore, InlineButton, OutboxOp, ScheduledAction, ScheduledActionStore, UserStore,
    VoiceInstruction,
};

use super::incident_service::IncidentService;
use super::outbox_dispatcher::OutboxDispatcher;
use super::scheduler::{action_types, ActionHandler};

/// Seconds of DTMF gathering after the prompt.
const GATHER_TIMEOUT_SECS: u32 = 10;

/// Headroom on top of ring timeout for TTS playback and gathering.
const CALL_DURATION_HEADROOM_SECS: u32 = 60;

/// Delay before re-driving a transiently failed chat send.
const RETRY_OUTBOX_DELAY_SECS: u32 = 5;

/// Payload of a `place_call_attempt` scheduled action.
#[derive(Debug, Serialize, Deserialize)]
struct PlaceCallPayload {
    alert_id: AlertId,
    attempt_no: u32,
}

/// Payload of a `send_chat_reminder` scheduled action.
#[derive(Debug, Serialize, Deserialize)]
struct ReminderPayload {
    n: u32,
}

/// Payload of a `retry_outbox` scheduled action.
#[derive(Debug, Serialize, Deserialize)]
struct RetryOutboxPayload {
    key: String,
}

pub struct CascadeService {
    incidents: Arc<dyn IncidentStore>,
    guardians: Arc<dyn GuardianStore>,
    users: Arc<dyn UserStore>,
    alerts: Arc<dyn AlertStore>,
    attempts: Arc<dyn CallAttemptStore>,
    actions: Arc<dyn ScheduledActionStore>,
    dispatcher: Arc<OutboxDispatcher>,
    incident_service: Arc<IncidentService>,
    chat: Arc<dyn ChatPort>,
    defaults: CascadeDefaults,
    whitelist: WhitelistPolicy,
    voice_webhook_url: String,
    language: Language,
    panic_enabled: bool,
}

impl CascadeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        incidents: Arc<dyn IncidentStore>,
        guardians: Arc<dyn GuardianStore>,
        users: Arc<dyn UserStore>,
        alerts: Arc<dyn AlertStore>,
        attempts: Arc<dyn CallAttemptStore>,
        actions: Arc<dyn ScheduledActionStore>,
        dispatcher: Arc<OutboxDispatcher>,
        incident_service: Arc<IncidentService>,
        chat: Arc<dyn ChatPort>,
        defaults: CascadeDefaults,
        whitelist: WhitelistPolicy,
        voice_webhook_url: String,
        language: Language,
        panic_enabled: bool,
    ) -> Self {
        Self {
            incidents,
            guardians,
            users,
            alerts,
            attempts,
            actions,
            dispatcher,
            incident_service,
            chat,
            defaults,
            whitelist,
            voice_webhook_url,
            language,
            panic_enabled,
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Entry points
    // ════════════════════════════════════════════════════════════════

    /// Opens an incident and seeds its cascade.
    pub async fn open_panic(
        &self,
        traveler_id: UserId,
        now: Timestamp,
    ) -> Result<Incident, DomainError> {
        let incident = self.incident_service.open(traveler_id, now).await?;
        self.seed(&incident, now).await?;
        Ok(incident)
    }

    /// Routes one normalized inbound command.
    pub async fn handle_command(
        &self,
        command: InboundCommand,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        match command {
            InboundCommand::ChatPanic { by_chat_user } => {
                if !self.panic_enabled {
                    tracing::info!(chat_user = %by_chat_user, "panic feature disabled, ignoring");
                    return Ok(());
                }
                let Some(user) = self.users.find_by_chat_user_id(&by_chat_user).await? else {
                    tracing::warn!(chat_user = %by_chat_user, "panic from unknown chat user");
                    return Ok(());
                };
                self.open_panic(user.id, now).await?;
                Ok(())
            }

            InboundCommand::ChatAck {
                incident_id,
                by_chat_user,
                callback_id,
            } => {
                self.answer_callback(&callback_id).await;
                self.chat_acknowledge(incident_id, &by_chat_user, now).await
            }

            InboundCommand::ChatCancel {
                incident_id,
                by_chat_user,
                callback_id,
            } => {
                self.answer_callback(&callback_id).await;
                self.chat_cancel(incident_id, &by_chat_user, now).await
            }

            InboundCommand::VoiceInitiated { provider_call_id } => {
                self.with_live_attempt(&provider_call_id, CallAttempt::note_ringing)
                    .await
            }

            InboundCommand::VoiceAnswered { provider_call_id } => {
                self.with_live_attempt(&provider_call_id, CallAttempt::note_answered)
                    .await
            }

            InboundCommand::VoiceDigit {
                provider_call_id,
                digit,
            } => self.voice_digit(&provider_call_id, digit, now).await,

            InboundCommand::VoiceHangup {
                provider_call_id,
                reason,
            } => {
                let Some(mut attempt) = self
                    .attempts
                    .find_by_provider_call_id(&provider_call_id)
                    .await?
                else {
                    tracing::warn!(call_id = %provider_call_id, "hangup for unknown call");
                    return Ok(());
                };
                if attempt.is_settled() {
                    return Ok(());
                }
                attempt.settle_on_hangup(reason, now)?;
                self.attempts.update(&attempt).await?;
                self.after_attempt_settled(&attempt, now).await
            }

            InboundCommand::VoiceAmd {
                provider_call_id,
                result,
            } => self.voice_amd(&provider_call_id, result, now).await,
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Seeding
    // ════════════════════════════════════════════════════════════════

    /// Creates alerts and schedules the first contact steps for every
    /// active guardian, in cascade order. Safe to re-run: alerts are
    /// keyed per (incident, audience, channel) and sends collapse in the
    /// outbox.
    pub async fn seed(&self, incident: &Incident, now: Timestamp) -> Result<(), DomainError> {
        let links = self.guardians.active_links_for(incident.traveler_id).await?;
        let targets = seed_targets(links);

        if targets.is_empty() {
            tracing::warn!(incident_id = %incident.id, "panic with no active guardians");
        }

        let traveler = self.users.get(incident.traveler_id).await?;
        let traveler_name = traveler
            .as_ref()
            .map(|u| u.display_name.clone())
            .unwrap_or_else(|| "traveler".to_string());

        self.notify_traveler_opened(incident, traveler.as_ref(), now)
            .await;

        let mut any_chat = false;

        for (index, link) in targets.iter().enumerate() {
            let Some(watcher) = self.users.get(link.watcher_id).await? else {
                tracing::warn!(watcher_id = %link.watcher_id, "guardian user missing, skipping");
                continue;
            };

            if link.chat_enabled {
                if let Some(chat_id) = watcher.chat_user_id.clone() {
                    any_chat = true;
                    self.seed_chat_alert(incident, link.watcher_id, chat_id, &traveler_name, now)
                        .await?;
                }
            }

            if link.call_enabled && watcher.phone.is_some() {
                self.seed_voice_alert(incident, link.watcher_id, index, now)
                    .await?;
            }
        }

        if any_chat {
            let reminder = ScheduledAction::new(
                incident.id,
                action_types::SEND_REMINDER,
                now.plus_secs(self.defaults.reminder_interval_secs),
                serde_json::to_value(ReminderPayload { n: 1 })
                    .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?,
            );
            self.actions.schedule(&reminder).await?;
        }

        Ok(())
    }

    async fn notify_traveler_opened(
        &self,
        incident: &Incident,
        traveler: Option<&User>,
        now: Timestamp,
    ) {
        let Some(chat_id) = traveler.and_then(|u| u.chat_user_id.clone()) else {
            return;
        };
        let op = OutboxOp::SendChatMessage {
            chat_id,
            text: texts::traveler_opened(self.language).to_string(),
            buttons: vec![InlineButton::new(
                texts::cancel_button(self.language),
                CallbackData::cancel(incident.id).encode(),
            )],
        };
        if let Err(e) = self
            .dispatcher
            .send(&chat_traveler_opened_key(incident.id), op, now)
            .await
        {
            tracing::warn!(incident_id = %incident.id, error = %e, "traveler open notice failed");
        }
    }

    async fn seed_chat_alert(
        &self,
        incident: &Incident,
        audience: UserId,
        chat_id: String,
        traveler_name: &str,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let mut alert = self
            .alerts
            .insert_if_absent(&Alert::new(incident.id, audience, AlertChannel::Chat, now))
            .await?;

        if alert.status == AlertStatus::Sent {
            return Ok(());
        }

        let key = chat_alert_key(incident.id, audience);
        let op = OutboxOp::SendChatMessage {
            chat_id,
            text: texts::chat_alert(self.language, traveler_name),
            buttons: vec![InlineButton::new(
                texts::ack_button(self.language),
                CallbackData::ack(incident.id).encode(),
            )],
        };

        alert.record_attempt();
        match self.dispatcher.send(&key, op, now).await {
            Ok(_) => alert.mark_sent(),
            Err(e) if e.is_retryable() => {
                alert.mark_failed(e.to_string());
                self.schedule_outbox_retry(incident.id, &key, now).await?;
            }
            Err(e) => alert.mark_failed(e.to_string()),
        }
        self.alerts.update(&alert).await
    }

    async fn seed_voice_alert(
        &self,
        incident: &Incident,
        audience: UserId,
        cascade_index: usize,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let alert = self
            .alerts
            .insert_if_absent(&Alert::new(incident.id, audience, AlertChannel::Voice, now))
            .await?;

        if alert.attempts > 0 {
            // Already seeded; the attempt pipeline owns it from here.
            return Ok(());
        }

        let action = ScheduledAction::new(
            incident.id,
            action_types::PLACE_CALL,
            stagger_first_call(now, cascade_index),
            serde_json::to_value(PlaceCallPayload {
                alert_id: alert.id,
                attempt_no: 1,
            })
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?,
        );
        self.actions.schedule(&action).await
    }

    async fn schedule_outbox_retry(
        &self,
        incident: IncidentId,
        key: &str,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let action = ScheduledAction::new(
            incident,
            action_types::RETRY_OUTBOX,
            now.plus_secs(RETRY_OUTBOX_DELAY_SECS),
            serde_json::to_value(RetryOutboxPayload {
                key: key.to_string(),
            })
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?,
        );
        self.actions.schedule(&action).await
    }

    // ════════════════════════════════════════════════════════════════
    // Chat command processing
    // ════════════════════════════════════════════════════════════════

    async fn chat_acknowledge(
        &self,
        incident_id: IncidentId,
        by_chat_user: &str,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let Some(user) = self.users.find_by_chat_user_id(by_chat_user).await? else {
            tracing::warn!(chat_user = %by_chat_user, "ack from unknown chat user");
            return Ok(());
        };

        let Some(incident) = self.incidents.get(incident_id).await? else {
            tracing::warn!(incident_id = %incident_id, "ack for unknown incident");
            return Ok(());
        };

        // Only a linked guardian may take responsibility.
        let link = self
            .guardians
            .find_link(incident.traveler_id, user.id)
            .await?;
        if !link.map(|l| l.is_active()).unwrap_or(false) {
            tracing::warn!(
                incident_id = %incident_id,
                user_id = %user.id,
                "ack from non-guardian ignored"
            );
            return Ok(());
        }

        self.incident_service
            .acknowledge(incident_id, user.id, AckChannel::ChatButton, now)
            .await?;
        Ok(())
    }

    async fn chat_cancel(
        &self,
        incident_id: IncidentId,
        by_chat_user: &str,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let Some(user) = self.users.find_by_chat_user_id(by_chat_user).await? else {
            tracing::warn!(chat_user = %by_chat_user, "cancel from unknown chat user");
            return Ok(());
        };

        match self
            .incident_service
            .cancel(incident_id, user.id, false, now)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.code == ErrorCode::Forbidden => {
                tracing::warn!(
                    incident_id = %incident_id,
                    user_id = %user.id,
                    "cancel from non-traveler ignored"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Answers the callback query so the chat client stops its spinner.
    /// Best-effort only.
    async fn answer_callback(&self, callback_id: &str) {
        if let Err(e) = self
            .chat
            .answer_callback(callback_id, texts::callback_received(self.language))
            .await
        {
            tracing::debug!(callback_id, error = %e, "answer_callback failed");
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Voice event processing
    // ════════════════════════════════════════════════════════════════

    /// Applies a mutation to an unsettled attempt correlated by provider
    /// call id. Unknown calls and settled attempts are no-ops.
    async fn with_live_attempt<F>(
        &self,
        provider_call_id: &str,
        mutate: F,
    ) -> Result<(), DomainError>
    where
        F: FnOnce(&mut CallAttempt),
    {
        let Some(mut attempt) = self
            .attempts
            .find_by_provider_call_id(provider_call_id)
            .await?
        else {
            tracing::debug!(call_id = %provider_call_id, "event for unknown call");
            return Ok(());
        };
        if attempt.is_settled() {
            return Ok(());
        }
        mutate(&mut attempt);
        self.attempts.update(&attempt).await
    }

    async fn voice_digit(
        &self,
        provider_call_id: &str,
        digit: char,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let Some(mut attempt) = self
            .attempts
            .find_by_provider_call_id(provider_call_id)
            .await?
        else {
            tracing::debug!(call_id = %provider_call_id, "digit for unknown call");
            return Ok(());
        };
        if attempt.is_settled() {
            return Ok(());
        }

        let acknowledged = attempt.note_digit(digit, now);
        self.attempts.update(&attempt).await?;

        if !acknowledged {
            return Ok(());
        }

        let Some(alert) = self.alerts.get(attempt.alert_id).await? else {
            return Err(DomainError::new(
                ErrorCode::AlertNotFound,
                format!("Attempt {} references missing alert", attempt.id),
            ));
        };

        self.incident_service
            .acknowledge(alert.incident_id, alert.audience_id, AckChannel::Dtmf, now)
            .await?;

        // The acknowledging call is settled, so the terminal fan-out does
        // not see it; end it explicitly.
        let key = voice_hangup_key(alert.incident_id, provider_call_id);
        let op = OutboxOp::HangupCall {
            provider_call_id: provider_call_id.to_string(),
        };
        if let Err(e) = self.dispatcher.send(&key, op, now).await {
            tracing::debug!(call_id = %provider_call_id, error = %e, "post-ack hangup failed");
        }

        Ok(())
    }

    async fn voice_amd(
        &self,
        provider_call_id: &str,
        result: AmdResult,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if result == AmdResult::Human {
            return Ok(());
        }

        let Some(mut attempt) = self
            .attempts
            .find_by_provider_call_id(provider_call_id)
            .await?
        else {
            return Ok(());
        };
        if attempt.is_settled() {
            return Ok(());
        }

        attempt.note_machine();
        self.attempts.update(&attempt).await?;

        // No point playing the prompt to voicemail; end the call. The
        // hangup event settles the attempt as answered-machine.
        let Some(alert) = self.alerts.get(attempt.alert_id).await? else {
            return Ok(());
        };
        let key = voice_hangup_key(alert.incident_id, provider_call_id);
        let op = OutboxOp::HangupCall {
            provider_call_id: provider_call_id.to_string(),
        };
        if let Err(e) = self.dispatcher.send(&key, op, now).await {
            tracing::debug!(call_id = %provider_call_id, error = %e, "machine hangup failed");
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════
    // Attempt lifecycle
    // ════════════════════════════════════════════════════════════════

    /// Places call attempt n for an alert. Invoked by the scheduler.
    async fn place_call_attempt(
        &self,
        action: &ScheduledAction,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let payload: PlaceCallPayload = serde_json::from_value(action.payload.clone())
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        let Some(mut alert) = self.alerts.get(payload.alert_id).await? else {
            return Err(DomainError::new(
                ErrorCode::AlertNotFound,
                format!("Unknown alert {}", payload.alert_id),
            ));
        };

        let Some(incident) = self.incidents.get(alert.incident_id).await? else {
            return Err(DomainError::new(
                ErrorCode::IncidentNotFound,
                format!("Unknown incident {}", alert.incident_id),
            ));
        };

        if !incident.is_open() || alert.is_halted() {
            return Ok(());
        }

        let link = self
            .guardians
            .find_link(incident.traveler_id, alert.audience_id)
            .await?;
        let Some(link) = link.filter(|l| l.is_active() && l.call_enabled) else {
            alert.halt();
            self.alerts.update(&alert).await?;
            return Ok(());
        };

        let Some(watcher) = self.users.get(alert.audience_id).await? else {
            alert.mark_failed("guardian user missing");
            alert.halt();
            self.alerts.update(&alert).await?;
            return Ok(());
        };
        let Some(phone) = watcher.phone else {
            alert.mark_failed("guardian has no phone number");
            alert.halt();
            self.alerts.update(&alert).await?;
            self.check_exhaustion(&incident, now).await;
            return Ok(());
        };

        if !self.whitelist.allows(&phone) {
            let mut attempt = CallAttempt::new(alert.id, payload.attempt_no, now);
            attempt.settle_failed("number_not_whitelisted", now);
            self.attempts.begin(&attempt).await?;
            alert.record_attempt();
            alert.mark_failed("number_not_whitelisted");
            alert.halt();
            self.alerts.update(&alert).await?;
            self.check_exhaustion(&incident, now).await;
            return Ok(());
        }

        // Begin the attempt, or pick up an earlier one whose placement
        // never reached the provider.
        let mut attempt = match self
            .attempts
            .begin(&CallAttempt::new(alert.id, payload.attempt_no, now))
            .await?
        {
            BeginAttempt::Started(a) => {
                alert.record_attempt();
                self.alerts.update(&alert).await?;
                a
            }
            BeginAttempt::AlreadyPending(existing) => {
                if existing.is_settled() || existing.provider_call_id.is_some() {
                    // Placement already in flight or this attempt number
                    // already ran; nothing to do.
                    return Ok(());
                }
                existing
            }
        };

        let traveler_name = match self.users.get(incident.traveler_id).await? {
            Some(u) => u.display_name,
            None => "traveler".to_string(),
        };

        let request = CallRequest {
            to: phone,
            instructions: vec![
                VoiceInstruction::Speak {
                    language: self.language.tag().to_string(),
                    text: texts::voice_panic_prompt(self.language, &traveler_name),
                },
                VoiceInstruction::GatherDtmf {
                    max_digits: 1,
                    timeout_secs: GATHER_TIMEOUT_SECS,
                    finish_on_key: None,
                },
                VoiceInstruction::Hangup,
            ],
            result_webhook_url: self.voice_webhook_url.clone(),
            ring_timeout_secs: link.ring_timeout_secs,
            max_duration_secs: link.ring_timeout_secs + CALL_DURATION_HEADROOM_SECS,
        };

        let key = voice_attempt_key(incident.id, alert.audience_id, attempt.attempt_no);
        match self
            .dispatcher
            .send(&key, OutboxOp::PlaceCall { request }, now)
            .await
        {
            Ok(outcome) => {
                if let Some(call_id) = outcome.provider_message_id {
                    attempt.note_placed(call_id);
                    self.attempts.update(&attempt).await?;
                }
                alert.mark_sent();
                self.alerts.update(&alert).await?;
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                // Leave the attempt unsettled; the runner retries this
                // action and the placement re-drives under the same key.
                Err(e)
            }
            Err(e) => {
                attempt.settle_failed(e.to_string(), now);
                self.attempts.update(&attempt).await?;
                alert.mark_failed(e.to_string());
                self.alerts.update(&alert).await?;
                self.after_attempt_settled(&attempt, now).await
            }
        }
    }

    /// Decides what follows a settled, non-acknowledged attempt: the next
    /// retry, or halting the alert and possibly the whole cascade.
    async fn after_attempt_settled(
        &self,
        attempt: &CallAttempt,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if attempt.result == CallResult::Acknowledged {
            return Ok(());
        }

        let Some(mut alert) = self.alerts.get(attempt.alert_id).await? else {
            return Ok(());
        };
        let Some(incident) = self.incidents.get(alert.incident_id).await? else {
            return Ok(());
        };

        if !incident.is_open() {
            return Ok(());
        }

        let link = self
            .guardians
            .find_link(incident.traveler_id, alert.audience_id)
            .await?
            .filter(|l| l.is_active());

        let ended_at = attempt.ended_at.unwrap_or(now);
        let total_ring = self.attempts.total_ring_secs(alert.id).await?;

        let decision = match link {
            Some(link) => next_call_attempt(
                &link,
                attempt.attempt_no,
                total_ring,
                ended_at,
                &self.defaults,
            ),
            None => RetryDecision::Exhausted,
        };

        match decision {
            RetryDecision::Retry { attempt_no, run_at } => {
                let action = ScheduledAction::new(
                    incident.id,
                    action_types::PLACE_CALL,
                    run_at,
                    serde_json::to_value(PlaceCallPayload {
                        alert_id: alert.id,
                        attempt_no,
                    })
                    .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?,
                );
                self.actions.schedule(&action).await
            }
            RetryDecision::Exhausted => {
                alert.halt();
                self.alerts.update(&alert).await?;
                self.check_exhaustion(&incident, now).await;
                Ok(())
            }
        }
    }

    /// When the last voice alert halts without an acknowledgment, tell
    /// the traveler nobody could be reached.
    async fn check_exhaustion(&self, incident: &Incident, now: Timestamp) {
        let alerts = match self.alerts.list_for_incident(incident.id).await {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(incident_id = %incident.id, error = %e, "failed to list alerts");
                return;
            }
        };

        let voice: Vec<_> = alerts
            .iter()
            .filter(|a| a.channel == AlertChannel::Voice)
            .collect();
        if voice.is_empty() || !voice.iter().all(|a| a.is_halted()) {
            return;
        }

        metrics::counter!("cascade_exhausted_total").increment(1);
        tracing::warn!(incident_id = %incident.id, "every voice alert exhausted");

        let chat_id = match self.users.get(incident.traveler_id).await {
            Ok(Some(u)) => u.chat_user_id,
            _ => None,
        };
        let Some(chat_id) = chat_id else { return };

        let op = OutboxOp::SendChatMessage {
            chat_id,
            text: texts::traveler_unreachable(self.language).to_string(),
            buttons: vec![],
        };
        if let Err(e) = self
            .dispatcher
            .send(&chat_traveler_unreachable_key(incident.id), op, now)
            .await
        {
            tracing::warn!(incident_id = %incident.id, error = %e, "unreachable notice failed");
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Reminders
    // ════════════════════════════════════════════════════════════════

    /// Edits every guardian's chat alert with an updated reminder counter
    /// and schedules the next round. Invoked by the scheduler.
    async fn send_reminders(
        &self,
        action: &ScheduledAction,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let payload: ReminderPayload = serde_json::from_value(action.payload.clone())
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        let Some(incident) = self.incidents.get(action.incident_id).await? else {
            return Ok(());
        };
        if !incident.is_open() {
            return Ok(());
        }

        let traveler_name = match self.users.get(incident.traveler_id).await? {
            Some(u) => u.display_name,
            None => "traveler".to_string(),
        };

        let alerts = self.alerts.list_for_incident(incident.id).await?;
        for alert in alerts
            .iter()
            .filter(|a| a.channel == AlertChannel::Chat && a.status == AlertStatus::Sent)
        {
            let chat_id = match self.users.get(alert.audience_id).await? {
                Some(u) => match u.chat_user_id {
                    Some(id) => id,
                    None => continue,
                },
                None => continue,
            };

            let op = OutboxOp::EditChatMessage {
                chat_id,
                original_key: chat_alert_key(incident.id, alert.audience_id),
                text: texts::chat_reminder(self.language, &traveler_name, payload.n),
                buttons: vec![InlineButton::new(
                    texts::ack_button(self.language),
                    CallbackData::ack(incident.id).encode(),
                )],
            };
            let key = chat_reminder_key(incident.id, alert.audience_id, payload.n);
            if let Err(e) = self.dispatcher.send(&key, op, now).await {
                tracing::warn!(key, error = %e, "reminder edit failed");
            }
        }

        let next = ScheduledAction::new(
            incident.id,
            action_types::SEND_REMINDER,
            now.plus_secs(self.defaults.reminder_interval_secs),
            serde_json::to_value(ReminderPayload { n: payload.n + 1 })
                .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?,
        );
        self.actions.schedule(&next).await
    }
}

/// Scheduler handler for `place_call_attempt`.
pub struct PlaceCallHandler {
    service: Arc<CascadeService>,
}

impl PlaceCallHandler {
    pub fn new(service: Arc<CascadeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ActionHandler for PlaceCallHandler {
    async fn run(&self, action: &ScheduledAction, now: Timestamp) -> Result<(), DomainError> {
        self.service.place_call_attempt(action, now).await
    }
}

/// Scheduler handler for `send_chat_reminder`.
pub struct ReminderHandler {
    service: Arc<CascadeService>,
}

impl ReminderHandler {
    pub fn new(service: Arc<CascadeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ActionHandler for ReminderHandler {
    async fn run(&self, action: &ScheduledAction, now: Timestamp) -> Result<(), DomainError> {
        self.service.send_reminders(action, now).await
    }
}

/// Scheduler handler for `retry_outbox`.
pub struct RetryOutboxHandler {
    dispatcher: Arc<OutboxDispatcher>,
}

impl RetryOutboxHandler {
    pub fn new(dispatcher: Arc<OutboxDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ActionHandler for RetryOutboxHandler {
    async fn run(&self, action: &ScheduledAction, _now: Timestamp) -> Result<(), DomainError> {
        let payload: RetryOutboxPayload = serde_json::from_value(action.payload.clone())
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        self.dispatcher.redrive(&payload.key).await?;
        Ok(())
    }
}
