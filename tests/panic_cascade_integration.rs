//! End-to-end cascade scenarios over the in-memory adapters.
//!
//! The suite wires the real services (incident, cascade, dispatcher,
//! ingest, scheduler runner) against in-memory stores and recording
//! provider ports, and drives time explicitly through the runner's
//! `poll_once(now)`.

use std::sync::Arc;

use protectogram::adapters::memory::{InMemoryStore, RecordingChatPort, RecordingVoicePort};
use protectogram::application::scheduler::{
    action_types, AlwaysLeader, HandlerRegistry, SchedulerConfig, SchedulerRunner,
};
use protectogram::application::{
    CascadeService, IncidentService, OutboxDispatcher, PlaceCallHandler, ReconcileAckHandler,
    ReminderHandler, RetryOutboxHandler,
};
use protectogram::domain::alert::HangupReason;
use protectogram::domain::cascade::{CascadeDefaults, Language, WhitelistPolicy};
use protectogram::domain::commands::InboundCommand;
use protectogram::domain::foundation::{PhoneNumber, Timestamp, UserId};
use protectogram::domain::guardian::GuardianLink;
use protectogram::domain::incident::IncidentStatus;
use protectogram::domain::user::User;
use protectogram::ports::{GuardianStore, IncidentStore, ScheduledActionStore, UserStore};

// =============================================================================
// Test world
// =============================================================================

const BASE_SECS: i64 = 1_700_000_000;

fn t(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(BASE_SECS + secs)
}

struct World {
    store: Arc<InMemoryStore>,
    chat: Arc<RecordingChatPort>,
    voice: Arc<RecordingVoicePort>,
    cascade: Arc<CascadeService>,
    incident_service: Arc<IncidentService>,
    runner: SchedulerRunner,
}

impl World {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let chat = Arc::new(RecordingChatPort::new());
        let voice = Arc::new(RecordingVoicePort::new());

        let dispatcher = Arc::new(OutboxDispatcher::new(
            store.clone(),
            chat.clone(),
            voice.clone(),
        ));
        let incident_service = Arc::new(IncidentService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            dispatcher.clone(),
            Language::En,
        ));
        let cascade = Arc::new(CascadeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            dispatcher.clone(),
            incident_service.clone(),
            chat.clone(),
            CascadeDefaults::default(),
            WhitelistPolicy::default(),
            "http://localhost:8080/webhook/voice".to_string(),
            Language::En,
            true,
        ));

        let registry = HandlerRegistry::new()
            .register(
                action_types::PLACE_CALL,
                Arc::new(PlaceCallHandler::new(cascade.clone())),
            )
            .register(
                action_types::SEND_REMINDER,
                Arc::new(ReminderHandler::new(cascade.clone())),
            )
            .register(
                action_types::RECONCILE_ACK,
                Arc::new(ReconcileAckHandler::new(incident_service.clone())),
            )
            .register(
                action_types::RETRY_OUTBOX,
                Arc::new(RetryOutboxHandler::new(dispatcher)),
            );
        let runner = SchedulerRunner::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(AlwaysLeader),
            SchedulerConfig::default(),
        );

        Self {
            store,
            chat,
            voice,
            cascade,
            incident_service,
            runner,
        }
    }

    /// A fresh runner over the same stores, as after a process restart.
    fn restarted_runner(&self) -> SchedulerRunner {
        let registry = HandlerRegistry::new()
            .register(
                action_types::PLACE_CALL,
                Arc::new(PlaceCallHandler::new(self.cascade.clone())),
            )
            .register(
                action_types::SEND_REMINDER,
                Arc::new(ReminderHandler::new(self.cascade.clone())),
            )
            .register(
                action_types::RECONCILE_ACK,
                Arc::new(ReconcileAckHandler::new(self.incident_service.clone())),
            );
        SchedulerRunner::new(
            self.store.clone(),
            Arc::new(registry),
            Arc::new(AlwaysLeader),
            SchedulerConfig::default(),
        )
    }

    async fn add_user(&self, name: &str, chat_id: Option<&str>, phone: Option<&str>) -> UserId {
        let mut user = User::new(name, t(0));
        if let Some(chat_id) = chat_id {
            user = user.with_chat_user_id(chat_id);
        }
        if let Some(phone) = phone {
            user = user.with_phone(PhoneNumber::parse(phone).unwrap());
        }
        let id = user.id;
        UserStore::insert(self.store.as_ref(), &user).await.unwrap();
        id
    }

    async fn link(
        &self,
        traveler: UserId,
        watcher: UserId,
        priority: u16,
        chat_enabled: bool,
        call_enabled: bool,
    ) {
        let mut link = GuardianLink::new(traveler, watcher, priority, 25, 2, 60, t(0)).unwrap();
        link.chat_enabled = chat_enabled;
        link.call_enabled = call_enabled;
        self.store.upsert_link(&link).await.unwrap();
    }

    async fn poll(&self, at: Timestamp) -> usize {
        self.runner.poll_once(at).await.unwrap()
    }

    async fn incident_status(&self, id: protectogram::domain::foundation::IncidentId) -> IncidentStatus {
        IncidentStore::get(self.store.as_ref(), id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    async fn scheduled_count(&self, id: protectogram::domain::foundation::IncidentId) -> u64 {
        self.store.count_scheduled_for(id).await.unwrap()
    }
}

// =============================================================================
// S1: happy path, chat acknowledgment
// =============================================================================

#[tokio::test]
async fn chat_ack_resolves_cascade() {
    let world = World::new();
    let traveler = world.add_user("Anna", Some("t-1"), None).await;
    let g1 = world.add_user("Boris", Some("g-1"), Some("+34600000001")).await;
    let g2 = world.add_user("Clara", Some("g-2"), None).await;
    world.link(traveler, g1, 1, true, true).await;
    world.link(traveler, g2, 2, true, false).await;

    let incident = world.cascade.open_panic(traveler, t(0)).await.unwrap();
    assert_eq!(world.incident_status(incident.id).await, IncidentStatus::Open);

    // Two guardian chat alerts plus the traveler's confirmation.
    let sent = world.chat.sent();
    let guardian_alerts: Vec<_> = sent.iter().filter(|m| m.chat_id != "t-1").collect();
    assert_eq!(guardian_alerts.len(), 2);
    assert!(guardian_alerts.iter().all(|m| !m.buttons.is_empty()));

    // G1's first call fires at ~t0.
    world.poll(t(1)).await;
    assert_eq!(world.voice.calls().len(), 1);

    // G1 presses the button within 5 seconds.
    world
        .cascade
        .handle_command(
            InboundCommand::ChatAck {
                incident_id: incident.id,
                by_chat_user: "g-1".to_string(),
                callback_id: "cb-1".to_string(),
            },
            t(5),
        )
        .await
        .unwrap();

    let resolved = IncidentStore::get(world.store.as_ref(), incident.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.status, IncidentStatus::Acknowledged);
    assert_eq!(resolved.acknowledged_by, Some(g1));

    // The in-flight call was hung up; everyone's alert got the terminal
    // edit; the traveler was notified; nothing remains scheduled.
    assert_eq!(world.voice.hangups().len(), 1);
    let edits = world.chat.edits();
    assert_eq!(edits.iter().filter(|e| e.text.contains("Boris")).count(), 2);
    assert!(world.chat.sent().iter().any(|m| m.chat_id == "t-1" && m.text.contains("Boris")));
    assert_eq!(world.scheduled_count(incident.id).await, 0);
}

// =============================================================================
// S2: DTMF acknowledgment after a no-answer retry
// =============================================================================

#[tokio::test]
async fn dtmf_ack_on_second_attempt() {
    let world = World::new();
    let traveler = world.add_user("Anna", Some("t-1"), None).await;
    let g1 = world.add_user("Boris", Some("g-1"), Some("+34600000001")).await;
    world.link(traveler, g1, 1, true, true).await;

    let incident = world.cascade.open_panic(traveler, t(0)).await.unwrap();

    // Attempt 1 fires at ~t0 and rings out at t25.
    world.poll(t(0)).await;
    let call_1 = world.voice.calls()[0].call_id.clone();
    world
        .cascade
        .handle_command(
            InboundCommand::VoiceHangup {
                provider_call_id: call_1,
                reason: HangupReason::Timeout,
            },
            t(25),
        )
        .await
        .unwrap();

    // Attempt 2 is scheduled for t85 (end of attempt 1 + 60s backoff),
    // not relative to whenever the runner polls.
    let retry = world
        .store
        .actions_snapshot()
        .into_iter()
        .find(|a| {
            a.action_type == action_types::PLACE_CALL
                && a.state == protectogram::ports::ActionState::Scheduled
        })
        .expect("retry scheduled");
    assert_eq!(retry.run_at, t(85));

    // Nothing fires early.
    world.poll(t(60)).await;
    assert_eq!(world.voice.calls().len(), 1);

    // Attempt 2 fires at t85; guardian answers and presses 1 at t90.
    world.poll(t(85)).await;
    assert_eq!(world.voice.calls().len(), 2);
    let call_2 = world.voice.calls()[1].call_id.clone();

    world
        .cascade
        .handle_command(
            InboundCommand::VoiceAnswered {
                provider_call_id: call_2.clone(),
            },
            t(85),
        )
        .await
        .unwrap();
    world
        .cascade
        .handle_command(
            InboundCommand::VoiceDigit {
                provider_call_id: call_2,
                digit: '1',
            },
            t(90),
        )
        .await
        .unwrap();

    let resolved = IncidentStore::get(world.store.as_ref(), incident.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.status, IncidentStatus::Acknowledged);
    assert_eq!(resolved.acknowledged_at, Some(t(90)));
    assert_eq!(resolved.acknowledged_by, Some(g1));

    // No attempt 3, nothing scheduled.
    world.poll(t(300)).await;
    assert_eq!(world.voice.calls().len(), 2);
    assert_eq!(world.scheduled_count(incident.id).await, 0);
}

// =============================================================================
// S4: traveler cancels mid-cascade
// =============================================================================

#[tokio::test]
async fn traveler_cancel_stops_everything() {
    let world = World::new();
    let traveler = world.add_user("Anna", Some("t-1"), None).await;
    let g1 = world.add_user("Boris", Some("g-1"), Some("+34600000001")).await;
    let g2 = world.add_user("Clara", Some("g-2"), Some("+34600000002")).await;
    world.link(traveler, g1, 1, true, true).await;
    world.link(traveler, g2, 2, true, true).await;

    let incident = world.cascade.open_panic(traveler, t(0)).await.unwrap();

    // Both calls in flight.
    world.poll(t(2)).await;
    assert_eq!(world.voice.calls().len(), 2);

    world
        .cascade
        .handle_command(
            InboundCommand::ChatCancel {
                incident_id: incident.id,
                by_chat_user: "t-1".to_string(),
                callback_id: "cb-c".to_string(),
            },
            t(10),
        )
        .await
        .unwrap();

    assert_eq!(
        world.incident_status(incident.id).await,
        IncidentStatus::Canceled
    );
    // Both in-flight calls were hangup-attempted, both guardians saw the
    // cancellation edit, and no retries remain.
    assert_eq!(world.voice.hangups().len(), 2);
    assert_eq!(
        world
            .chat
            .edits()
            .iter()
            .filter(|e| e.text.contains("Anna"))
            .count(),
        2
    );
    assert_eq!(world.scheduled_count(incident.id).await, 0);

    // Later polls place nothing new.
    world.poll(t(120)).await;
    assert_eq!(world.voice.calls().len(), 2);
}

#[tokio::test]
async fn non_traveler_cannot_cancel() {
    let world = World::new();
    let traveler = world.add_user("Anna", Some("t-1"), None).await;
    let g1 = world.add_user("Boris", Some("g-1"), None).await;
    world.link(traveler, g1, 1, true, false).await;

    let incident = world.cascade.open_panic(traveler, t(0)).await.unwrap();

    // A guardian pressing a forged cancel button is ignored.
    world
        .cascade
        .handle_command(
            InboundCommand::ChatCancel {
                incident_id: incident.id,
                by_chat_user: "g-1".to_string(),
                callback_id: "cb-x".to_string(),
            },
            t(5),
        )
        .await
        .unwrap();

    assert_eq!(world.incident_status(incident.id).await, IncidentStatus::Open);
}

// =============================================================================
// S5: scheduler restart mid-cascade
// =============================================================================

#[tokio::test]
async fn restart_preserves_backoff_origin() {
    let world = World::new();
    let traveler = world.add_user("Anna", Some("t-1"), None).await;
    let g1 = world.add_user("Boris", Some("g-1"), Some("+34600000001")).await;
    world.link(traveler, g1, 1, false, true).await;

    world.cascade.open_panic(traveler, t(0)).await.unwrap();
    world.poll(t(0)).await;
    let call_1 = world.voice.calls()[0].call_id.clone();

    // Process "dies" at t10 (the old runner is simply never polled
    // again). The no-answer result still arrives via webhook at t25.
    world
        .cascade
        .handle_command(
            InboundCommand::VoiceHangup {
                provider_call_id: call_1,
                reason: HangupReason::Timeout,
            },
            t(25),
        )
        .await
        .unwrap();

    // Restart at t40: the retry must still be anchored to the attempt's
    // end (t25 + 60 = t85), not to the restart time.
    let restarted = world.restarted_runner();
    restarted.poll_once(t(40)).await.unwrap();
    assert_eq!(world.voice.calls().len(), 1, "no early redial after restart");

    restarted.poll_once(t(85)).await.unwrap();
    assert_eq!(world.voice.calls().len(), 2);

    let attempt_2 = world
        .store
        .attempts_snapshot()
        .into_iter()
        .find(|a| a.attempt_no == 2)
        .expect("attempt 2 placed");
    assert_eq!(attempt_2.started_at, t(85));
}

// =============================================================================
// Exhaustion: nobody reachable
// =============================================================================

#[tokio::test]
async fn exhausted_cascade_notifies_traveler() {
    let world = World::new();
    let traveler = world.add_user("Anna", Some("t-1"), None).await;
    let g1 = world.add_user("Boris", None, Some("+34600000001")).await;
    world.link(traveler, g1, 1, false, true).await;

    let incident = world.cascade.open_panic(traveler, t(0)).await.unwrap();

    // Attempt 1: rings out.
    world.poll(t(0)).await;
    let call_1 = world.voice.calls()[0].call_id.clone();
    world
        .cascade
        .handle_command(
            InboundCommand::VoiceHangup {
                provider_call_id: call_1,
                reason: HangupReason::Timeout,
            },
            t(25),
        )
        .await
        .unwrap();

    // Attempt 2 (the last allowed): also rings out.
    world.poll(t(85)).await;
    let call_2 = world.voice.calls()[1].call_id.clone();
    world
        .cascade
        .handle_command(
            InboundCommand::VoiceHangup {
                provider_call_id: call_2,
                reason: HangupReason::Timeout,
            },
            t(110),
        )
        .await
        .unwrap();

    // Retry budget spent: attempts stop, the traveler hears about it.
    world.poll(t(300)).await;
    assert_eq!(world.voice.calls().len(), 2);
    assert!(world
        .chat
        .sent()
        .iter()
        .any(|m| m.chat_id == "t-1" && m.text.contains("could not reach")));
    assert_eq!(world.incident_status(incident.id).await, IncidentStatus::Open);
}

// =============================================================================
// Transient placement failure retries under the same idempotency key
// =============================================================================

#[tokio::test]
async fn transient_placement_failure_is_retried_not_duplicated() {
    let world = World::new();
    let traveler = world.add_user("Anna", Some("t-1"), None).await;
    let g1 = world.add_user("Boris", None, Some("+34600000001")).await;
    world.link(traveler, g1, 1, false, true).await;

    world.cascade.open_panic(traveler, t(0)).await.unwrap();

    world.voice.fail_next_transient(1);
    world.poll(t(0)).await;
    assert_eq!(world.voice.calls().len(), 0);

    // The runner rescheduled the action with backoff; a later poll
    // re-drives the same attempt and places exactly one call.
    world.poll(t(30)).await;
    assert_eq!(world.voice.calls().len(), 1);

    let attempts = world.store.attempts_snapshot();
    assert_eq!(attempts.len(), 1, "one attempt row despite the retry");
    assert_eq!(attempts[0].attempt_no, 1);
}
