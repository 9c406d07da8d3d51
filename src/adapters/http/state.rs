//! Shared state for the HTTP handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::SecretString;

use super::health::ReadinessProbe;
use crate::adapters::telnyx::VoiceWebhookVerifier;
use crate::application::{CascadeService, WebhookIngest};

#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<WebhookIngest>,
    pub cascade: Arc<CascadeService>,
    pub chat_webhook_secret: SecretString,
    pub voice_verifier: Arc<VoiceWebhookVerifier>,
    pub admin_key: SecretString,
    pub readiness: Arc<dyn ReadinessProbe>,
    pub metrics: PrometheusHandle,
    pub panic_enabled: bool,
}
