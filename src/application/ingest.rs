//! Webhook ingest: bridges authenticated provider callbacks into the
//! command pipeline through the inbox deduper.
//!
//! The inbox recording commits in its own transaction before the domain
//! handler runs; `processed_at` is set only after the handler finishes.
//! Events left unprocessed by a crash are re-dispatched by the sweep,
//! which the scheduler runner invokes periodically.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::commands::InboundCommand;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{InboxOutcome, InboxStore};

use super::cascade_service::CascadeService;
use super::scheduler::InboxSweep;

/// Age after which an unprocessed inbox row is retried.
const SWEEP_THRESHOLD_SECS: u32 = 60;

/// Rows per sweep pass.
const SWEEP_BATCH: u32 = 50;

/// Parses one provider's raw webhook payload into commands. Implemented
/// by the provider adapters and registered per provider tag.
pub trait PayloadParser: Send + Sync {
    fn parse(&self, payload: &Value) -> Result<Vec<InboundCommand>, DomainError>;
}

/// Outcome of ingesting one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Processed,
    Duplicate,
}

pub struct WebhookIngest {
    inbox: Arc<dyn InboxStore>,
    cascade: Arc<CascadeService>,
    parsers: HashMap<String, Arc<dyn PayloadParser>>,
}

impl WebhookIngest {
    pub fn new(inbox: Arc<dyn InboxStore>, cascade: Arc<CascadeService>) -> Self {
        Self {
            inbox,
            cascade,
            parsers: HashMap::new(),
        }
    }

    pub fn with_parser(mut self, provider: &str, parser: Arc<dyn PayloadParser>) -> Self {
        self.parsers.insert(provider.to_string(), parser);
        self
    }

    /// Records and processes one provider event. Redeliveries return
    /// `Duplicate` without touching the domain.
    pub async fn ingest(
        &self,
        provider: &str,
        event_id: &str,
        payload: Value,
        now: Timestamp,
    ) -> Result<IngestOutcome, DomainError> {
        match self.inbox.record(provider, event_id, &payload, now).await? {
            InboxOutcome::Duplicate => {
                metrics::counter!("webhook_duplicate_total", "provider" => provider.to_string())
                    .increment(1);
                tracing::debug!(provider, event_id, "duplicate webhook delivery");
                return Ok(IngestOutcome::Duplicate);
            }
            InboxOutcome::Fresh => {}
        }

        self.process(provider, event_id, &payload, now).await?;
        Ok(IngestOutcome::Processed)
    }

    /// Parses and dispatches; marks the event processed when the handler
    /// outcome is final. Retryable handler errors leave `processed_at`
    /// null so the sweep can re-dispatch.
    async fn process(
        &self,
        provider: &str,
        event_id: &str,
        payload: &Value,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let Some(parser) = self.parsers.get(provider) else {
            tracing::error!(provider, "no payload parser registered");
            self.inbox.mark_processed(provider, event_id, now).await?;
            return Ok(());
        };

        let commands = match parser.parse(payload) {
            Ok(commands) => commands,
            Err(e) => {
                // A payload that does not parse will never parse; record
                // the fact and move on.
                tracing::warn!(provider, event_id, error = %e, "unparseable webhook payload");
                self.inbox.mark_processed(provider, event_id, now).await?;
                return Ok(());
            }
        };

        for command in commands {
            if let Err(e) = self.cascade.handle_command(command, now).await {
                if e.is_retryable() {
                    tracing::warn!(provider, event_id, error = %e, "handler failed, leaving for sweep");
                    return Ok(());
                }
                // Domain-final errors do not benefit from redelivery.
                tracing::error!(provider, event_id, error = %e, "handler failed terminally");
            }
        }

        self.inbox.mark_processed(provider, event_id, now).await
    }

    /// Re-dispatches events that were recorded but never marked
    /// processed. Handlers are idempotent, so redelivery is safe.
    pub async fn sweep_unprocessed(&self, now: Timestamp) -> Result<u32, DomainError> {
        let cutoff = now.minus_secs(SWEEP_THRESHOLD_SECS);
        let stale = self.inbox.unprocessed_before(cutoff, SWEEP_BATCH).await?;

        let mut redispatched = 0;
        for event in stale {
            self.process(&event.provider, &event.event_id, &event.payload, now)
                .await?;
            redispatched += 1;
        }
        Ok(redispatched)
    }
}

#[async_trait]
impl InboxSweep for WebhookIngest {
    async fn sweep(&self, now: Timestamp) -> Result<u32, DomainError> {
        self.sweep_unprocessed(now).await
    }
}
