//! Idempotency laws and race scenarios: duplicate webhook deliveries,
//! double acknowledgments, outbox first-write-wins, and the DTMF vs
//! chat-button race.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use protectogram::adapters::memory::{InMemoryStore, RecordingChatPort, RecordingVoicePort};
use protectogram::adapters::telegram::{TelegramUpdateParser, PROVIDER_TAG as CHAT_TAG};
use protectogram::adapters::telnyx::{TelnyxEventParser, PROVIDER_TAG as VOICE_TAG};
use protectogram::application::{
    CascadeService, IncidentService, IngestOutcome, OutboxDispatcher, WebhookIngest,
};
use protectogram::domain::cascade::{CascadeDefaults, Language, WhitelistPolicy};
use protectogram::domain::commands::{CallbackData, InboundCommand};
use protectogram::domain::foundation::{IncidentId, PhoneNumber, Timestamp, UserId};
use protectogram::domain::guardian::GuardianLink;
use protectogram::domain::incident::{AckChannel, IncidentStatus};
use protectogram::domain::user::User;
use protectogram::ports::{
    GuardianStore, InboxOutcome, InboxStore, IncidentStore, InlineButton, OutboxOp, OutboxStatus,
    ScheduledActionStore, TerminalOutcome, UserStore,
};

const BASE_SECS: i64 = 1_700_000_000;

fn t(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(BASE_SECS + secs)
}

struct World {
    store: Arc<InMemoryStore>,
    chat: Arc<RecordingChatPort>,
    voice: Arc<RecordingVoicePort>,
    dispatcher: Arc<OutboxDispatcher>,
    incident_service: Arc<IncidentService>,
    cascade: Arc<CascadeService>,
    ingest: Arc<WebhookIngest>,
}

fn world() -> World {
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
    let ingest = Arc::new(
        WebhookIngest::new(store.clone(), cascade.clone())
            .with_parser(CHAT_TAG, Arc::new(TelegramUpdateParser::new()))
            .with_parser(VOICE_TAG, Arc::new(TelnyxEventParser::new())),
    );

    World {
        store,
        chat,
        voice,
        dispatcher,
        incident_service,
        cascade,
        ingest,
    }
}

async fn add_user(world: &World, name: &str, chat_id: Option<&str>, phone: Option<&str>) -> UserId {
    let mut user = User::new(name, t(0));
    if let Some(chat_id) = chat_id {
        user = user.with_chat_user_id(chat_id);
    }
    if let Some(phone) = phone {
        user = user.with_phone(PhoneNumber::parse(phone).unwrap());
    }
    let id = user.id;
    UserStore::insert(world.store.as_ref(), &user)
        .await
        .unwrap();
    id
}

async fn link(world: &World, traveler: UserId, watcher: UserId, priority: u16) {
    let link = GuardianLink::new(traveler, watcher, priority, 25, 2, 60, t(0)).unwrap();
    world.store.upsert_link(&link).await.unwrap();
}

fn ack_update(update_id: i64, incident_id: IncidentId, chat_user: i64) -> serde_json::Value {
    json!({
        "update_id": update_id,
        "callback_query": {
            "id": format!("cb-{}", update_id),
            "from": { "id": chat_user },
            "data": format!("v1|ack|{}", incident_id),
        }
    })
}

// =============================================================================
// S3: duplicate webhook deliveries
// =============================================================================

#[tokio::test]
async fn redelivered_ack_webhook_processes_once() {
    let w = world();
    let traveler = add_user(&w, "Anna", Some("100"), None).await;
    let g1 = add_user(&w, "Boris", Some("200"), None).await;
    link(&w, traveler, g1, 1).await;

    let incident = w.cascade.open_panic(traveler, t(0)).await.unwrap();
    let payload = ack_update(555, incident.id, 200);

    // The provider redelivers the same callback three times.
    let first = w
        .ingest
        .ingest(CHAT_TAG, "555", payload.clone(), t(5))
        .await
        .unwrap();
    let second = w
        .ingest
        .ingest(CHAT_TAG, "555", payload.clone(), t(6))
        .await
        .unwrap();
    let third = w.ingest.ingest(CHAT_TAG, "555", payload, t(7)).await.unwrap();

    assert_eq!(first, IngestOutcome::Processed);
    assert_eq!(second, IngestOutcome::Duplicate);
    assert_eq!(third, IngestOutcome::Duplicate);

    // Exactly one transition, acknowledged at the first delivery's time.
    let resolved = IncidentStore::get(w.store.as_ref(), incident.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.status, IncidentStatus::Acknowledged);
    assert_eq!(resolved.acknowledged_at, Some(t(5)));

    // Exactly one "traveler notified" outbox row.
    let traveler_notices = w
        .store
        .outbox_snapshot()
        .into_iter()
        .filter(|r| r.key.ends_with(":traveler:acknowledged"))
        .count();
    assert_eq!(traveler_notices, 1);
}

// =============================================================================
// S6: DTMF vs chat-button race
// =============================================================================

#[tokio::test]
async fn first_acknowledgment_wins_the_race() {
    let w = world();
    let traveler = add_user(&w, "Anna", Some("100"), None).await;
    let g1 = add_user(&w, "Boris", Some("200"), None).await;
    let g2 = add_user(&w, "Clara", Some("300"), Some("+34600000002")).await;
    link(&w, traveler, g1, 1).await;
    link(&w, traveler, g2, 2).await;

    let incident = w.cascade.open_panic(traveler, t(0)).await.unwrap();

    // G1's chat ack lands first, G2's DTMF 100ms later.
    w.cascade
        .handle_command(
            InboundCommand::ChatAck {
                incident_id: incident.id,
                by_chat_user: "200".to_string(),
                callback_id: "cb-a".to_string(),
            },
            t(10),
        )
        .await
        .unwrap();

    let late = w
        .incident_service
        .acknowledge(incident.id, g2, AckChannel::Dtmf, t(10))
        .await
        .unwrap();

    let resolved = IncidentStore::get(w.store.as_ref(), incident.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.acknowledged_by, Some(g1));
    assert_eq!(resolved.acknowledged_via, Some(AckChannel::ChatButton));
    assert!(matches!(late, TerminalOutcome::AlreadyTerminal(_)));

    // Both guardians still receive the "handled" edit.
    assert_eq!(
        w.chat
            .edits()
            .iter()
            .filter(|e| e.text.contains("Boris"))
            .count(),
        2
    );
}

// =============================================================================
// L1: acknowledge is idempotent once terminal
// =============================================================================

#[tokio::test]
async fn double_acknowledge_returns_first_decision() {
    let w = world();
    let traveler = add_user(&w, "Anna", Some("100"), None).await;
    let g1 = add_user(&w, "Boris", Some("200"), None).await;
    link(&w, traveler, g1, 1).await;

    let incident = w.cascade.open_panic(traveler, t(0)).await.unwrap();

    let first = w
        .incident_service
        .acknowledge(incident.id, g1, AckChannel::ChatButton, t(10))
        .await
        .unwrap();
    let second = w
        .incident_service
        .acknowledge(incident.id, g1, AckChannel::Dtmf, t(20))
        .await
        .unwrap();

    let TerminalOutcome::Applied(applied) = first else {
        panic!("first acknowledge must apply");
    };
    let TerminalOutcome::AlreadyTerminal(stored) = second else {
        panic!("second acknowledge must be a no-op");
    };
    assert_eq!(stored.acknowledged_at, applied.acknowledged_at);
    assert_eq!(stored.acknowledged_via, Some(AckChannel::ChatButton));
}

// =============================================================================
// L2: inbox record is idempotent
// =============================================================================

#[tokio::test]
async fn inbox_record_deduplicates() {
    let w = world();
    let payload = json!({"anything": true});

    let first = w
        .store
        .record(VOICE_TAG, "evt-1", &payload, t(0))
        .await
        .unwrap();
    let second = w
        .store
        .record(VOICE_TAG, "evt-1", &payload, t(1))
        .await
        .unwrap();
    let other_provider = w
        .store
        .record(CHAT_TAG, "evt-1", &payload, t(1))
        .await
        .unwrap();

    assert_eq!(first, InboxOutcome::Fresh);
    assert_eq!(second, InboxOutcome::Duplicate);
    // The (provider, event-id) pair is the identity, not the id alone.
    assert_eq!(other_provider, InboxOutcome::Fresh);
}

// =============================================================================
// L3 / P3: outbox first write wins, one provider call per key
// =============================================================================

#[tokio::test]
async fn outbox_key_collapses_to_one_send() {
    let w = world();

    let op_a = OutboxOp::SendChatMessage {
        chat_id: "100".to_string(),
        text: "first".to_string(),
        buttons: vec![InlineButton::new("ok", "v1|ack|x")],
    };
    let op_b = OutboxOp::SendChatMessage {
        chat_id: "100".to_string(),
        text: "second".to_string(),
        buttons: vec![],
    };

    let first = w.dispatcher.send("k-1", op_a, t(0)).await.unwrap();
    let second = w.dispatcher.send("k-1", op_b, t(1)).await.unwrap();

    assert!(!first.already_sent);
    assert!(second.already_sent);
    assert_eq!(second.provider_message_id, first.provider_message_id);

    // One real provider call, carrying the first payload.
    let sent = w.chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "first");
}

#[tokio::test]
async fn failed_send_re_drives_without_duplicating() {
    let w = world();

    let op = OutboxOp::SendChatMessage {
        chat_id: "100".to_string(),
        text: "hello".to_string(),
        buttons: vec![],
    };

    w.chat.fail_next_transient(1);
    let first = w.dispatcher.send("k-2", op.clone(), t(0)).await;
    assert!(first.is_err());

    let record = w.store.outbox_snapshot().into_iter().find(|r| r.key == "k-2").unwrap();
    assert_eq!(record.status, OutboxStatus::Failed);

    // The retry reuses the stored row and succeeds exactly once.
    let second = w.dispatcher.send("k-2", op, t(5)).await.unwrap();
    assert!(!second.already_sent);
    assert_eq!(w.chat.sent().len(), 1);
}

// =============================================================================
// P2: voice events flow through the inbox exactly once
// =============================================================================

#[tokio::test]
async fn voice_event_redelivery_is_ignored() {
    let w = world();
    let traveler = add_user(&w, "Anna", Some("100"), None).await;
    let g1 = add_user(&w, "Boris", None, Some("+34600000001")).await;
    let link_row = GuardianLink::new(traveler, g1, 1, 25, 2, 60, t(0)).unwrap();
    w.store.upsert_link(&link_row).await.unwrap();

    let incident = w.cascade.open_panic(traveler, t(0)).await.unwrap();
    assert_eq!(
        IncidentStore::get(w.store.as_ref(), incident.id)
            .await
            .unwrap()
            .unwrap()
            .status,
        IncidentStatus::Open
    );

    let payload = json!({
        "data": {
            "id": "evt-dup",
            "event_type": "call.hangup",
            "payload": { "call_control_id": "cc-unknown", "hangup_cause": "timeout" }
        }
    });

    let first = w
        .ingest
        .ingest(VOICE_TAG, "evt-dup", payload.clone(), t(30))
        .await
        .unwrap();
    let second = w
        .ingest
        .ingest(VOICE_TAG, "evt-dup", payload, t(31))
        .await
        .unwrap();

    assert_eq!(first, IngestOutcome::Processed);
    assert_eq!(second, IngestOutcome::Duplicate);
}

// =============================================================================
// P4: terminal incidents never keep scheduled actions
// =============================================================================

#[tokio::test]
async fn terminal_incident_has_no_scheduled_actions() {
    let w = world();
    let traveler = add_user(&w, "Anna", Some("100"), None).await;
    let g1 = add_user(&w, "Boris", Some("200"), Some("+34600000001")).await;
    link(&w, traveler, g1, 1).await;

    let incident = w.cascade.open_panic(traveler, t(0)).await.unwrap();
    assert!(w.store.count_scheduled_for(incident.id).await.unwrap() > 0);

    w.incident_service
        .acknowledge(incident.id, g1, AckChannel::ChatButton, t(3))
        .await
        .unwrap();

    assert_eq!(w.store.count_scheduled_for(incident.id).await.unwrap(), 0);
    assert_eq!(w.voice.calls().len(), 0, "no call was ever placed");
}

// =============================================================================
// Codec and normalization properties
// =============================================================================

proptest! {
    #[test]
    fn callback_data_roundtrips_for_any_incident(uuid_bytes in any::<[u8; 16]>()) {
        let incident_id = IncidentId::from_uuid(uuid::Uuid::from_bytes(uuid_bytes));

        for data in [CallbackData::ack(incident_id), CallbackData::cancel(incident_id)] {
            let encoded = data.encode();
            prop_assert!(encoded.len() <= 64);
            let parsed = CallbackData::parse(&encoded).unwrap();
            prop_assert_eq!(parsed.incident_id, incident_id);
            prop_assert_eq!(parsed.action, data.action);
        }
    }

    #[test]
    fn phone_normalization_accepts_separators(
        cc in 1u32..=999,
        rest in proptest::collection::vec(0u8..=9, 7..=11),
    ) {
        let digits: String = rest.iter().map(|d| d.to_string()).collect();
        let raw = format!("+{} {}", cc, digits);
        let compact = format!("+{}{}", cc, digits);

        if compact.len() - 1 <= 15 {
            let parsed = PhoneNumber::parse(&raw).unwrap();
            prop_assert_eq!(parsed.as_str(), compact.as_str());
        }
    }

    #[test]
    fn phone_rejects_plain_digits(digits in proptest::collection::vec(0u8..=9, 8..=12)) {
        let raw: String = digits.iter().map(|d| d.to_string()).collect();
        // Without + or 00 there is no country prefix to normalize.
        if !raw.starts_with('0') {
            prop_assert!(PhoneNumber::parse(&raw).is_err());
        }
    }
}
