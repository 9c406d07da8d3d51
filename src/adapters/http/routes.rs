//! HTTP route table.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::admin::trigger_panic;
use super::state::AppState;
use super::webhooks::{chat_webhook, voice_webhook};

/// Builds the full application router.
pub fn router(state: AppState, request_timeout_secs: u64) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/webhook/chat", post(chat_webhook))
        .route("/webhook/voice", post(voice_webhook))
        .route("/admin/panic/trigger", post(trigger_panic))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// GET /health/live
async fn live() -> Response {
    StatusCode::OK.into_response()
}

/// GET /health/ready
async fn ready(State(state): State<AppState>) -> Response {
    if state.readiness.ready().await {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> Response {
    state.metrics.render().into_response()
}
