//! Provider webhook endpoints.
//!
//! Authentication failures are 401, malformed payloads 400. Domain
//! errors are logged and answered 200 so providers do not enter a
//! redelivery storm; only infrastructure failure earns a 5xx.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use secrecy::ExposeSecret;
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::adapters::{telegram, telnyx};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

use super::state::AppState;

/// Header carrying the chat webhook shared secret.
const CHAT_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Headers carrying the voice webhook HMAC material.
const VOICE_TIMESTAMP_HEADER: &str = "x-voice-timestamp";
const VOICE_SIGNATURE_HEADER: &str = "x-voice-signature";

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn reject(provider: &str, reason: &'static str, status: StatusCode) -> Response {
    metrics::counter!(
        "webhook_rejected_total",
        "provider" => provider.to_string(),
        "reason" => reason
    )
    .increment(1);
    status.into_response()
}

/// Maps a domain failure to the response contract above.
fn domain_outcome(provider: &str, event_id: &str, result: Result<(), DomainError>) -> Response {
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) if e.code == ErrorCode::DatabaseError => {
            tracing::error!(provider, event_id, error = %e, "webhook processing hit infrastructure failure");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!(provider, event_id, error = %e, "webhook processing failed");
            StatusCode::OK.into_response()
        }
    }
}

/// POST /webhook/chat
pub async fn chat_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provided = headers
        .get(CHAT_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let expected = state.chat_webhook_secret.expose_secret();
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return reject(telegram::PROVIDER_TAG, "bad_token", StatusCode::UNAUTHORIZED);
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return reject(telegram::PROVIDER_TAG, "bad_json", StatusCode::BAD_REQUEST);
    };
    let Some(event_id) = telegram::update_event_id(&payload) else {
        return reject(telegram::PROVIDER_TAG, "no_update_id", StatusCode::BAD_REQUEST);
    };

    let result = state
        .ingest
        .ingest(telegram::PROVIDER_TAG, &event_id, payload, Timestamp::now())
        .await
        .map(|_| ());
    domain_outcome(telegram::PROVIDER_TAG, &event_id, result)
}

/// POST /webhook/voice
pub async fn voice_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let timestamp = headers
        .get(VOICE_TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let signature = headers
        .get(VOICE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Err(e) = state.voice_verifier.verify(timestamp, signature, &body) {
        tracing::warn!(error = %e, "voice webhook signature rejected");
        return reject(telnyx::PROVIDER_TAG, "bad_signature", StatusCode::UNAUTHORIZED);
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return reject(telnyx::PROVIDER_TAG, "bad_json", StatusCode::BAD_REQUEST);
    };
    let Some(event_id) = telnyx::voice_event_id(&payload) else {
        return reject(telnyx::PROVIDER_TAG, "no_event_id", StatusCode::BAD_REQUEST);
    };

    let result = state
        .ingest
        .ingest(telnyx::PROVIDER_TAG, &event_id, payload, Timestamp::now())
        .await
        .map(|_| ());
    domain_outcome(telnyx::PROVIDER_TAG, &event_id, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_requires_equal_length_and_content() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(constant_time_eq(b"", b""));
    }
}
