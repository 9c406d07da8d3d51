//! Application services: the orchestration between domain decisions,
//! stores, and provider ports.

mod cascade_service;
mod incident_service;
mod ingest;
mod outbox_dispatcher;
pub mod scheduler;

pub use cascade_service::{CascadeService, PlaceCallHandler, ReminderHandler, RetryOutboxHandler};
pub use incident_service::{IncidentService, ReconcileAckHandler};
pub use ingest::{IngestOutcome, PayloadParser, WebhookIngest};
pub use outbox_dispatcher::{OutboxDispatcher, SendOutcome};
