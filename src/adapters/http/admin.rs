//! Admin trigger surface: manual panic seeding for staging smoke tests.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::domain::foundation::{ErrorCode, Timestamp, UserId};

use super::dto::{ErrorResponse, TriggerPanicRequest, TriggerPanicResponse};
use super::state::AppState;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    provided.len() == expected.len() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

/// POST /admin/panic/trigger
pub async fn trigger_panic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TriggerPanicRequest>,
) -> Response {
    if !authorized(&headers, state.admin_key.expose_secret()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if !state.panic_enabled {
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("panic feature disabled")),
        )
            .into_response();
    }

    let traveler_id = UserId::from_uuid(request.traveler_id);
    match state.cascade.open_panic(traveler_id, Timestamp::now()).await {
        Ok(incident) => (
            StatusCode::OK,
            Json(TriggerPanicResponse {
                incident_id: incident.id.to_string(),
            }),
        )
            .into_response(),
        Err(e) if e.code == ErrorCode::UserNotFound => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "admin panic trigger failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal error")),
            )
                .into_response()
        }
    }
}
