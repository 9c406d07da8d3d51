//! Handler registry: the string -> handler map established at startup.
//!
//! Handlers are idempotent by contract; the incident state guards
//! duplicate work, so a handler fired twice (at-least-once delivery) or
//! after the incident went terminal is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::ScheduledAction;

/// Well-known action types.
pub mod action_types {
    /// Place call attempt n for one voice alert.
    pub const PLACE_CALL: &str = "place_call_attempt";
    /// Edit guardian chat alerts with an updated reminder counter.
    pub const SEND_REMINDER: &str = "send_chat_reminder";
    /// Re-run an acknowledgment that lost the advisory lock race.
    pub const RECONCILE_ACK: &str = "reconcile_ack";
    /// Re-drive an outbox key whose provider call failed transiently.
    pub const RETRY_OUTBOX: &str = "retry_outbox";
}

/// A scheduled-action handler.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Runs the action. `now` is the runner's poll time.
    ///
    /// A retryable error reschedules the action with backoff; any other
    /// error, or exceeding the retry ceiling, marks it failed.
    async fn run(&self, action: &ScheduledAction, now: Timestamp) -> Result<(), DomainError>;
}

/// String -> handler map.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, action_type: &str, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(action_type.to_string(), handler);
        self
    }

    pub fn get(&self, action_type: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(action_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::IncidentId;

    struct NoopHandler;

    #[async_trait]
    impl ActionHandler for NoopHandler {
        async fn run(&self, _: &ScheduledAction, _: Timestamp) -> Result<(), DomainError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registry_resolves_registered_types() {
        let registry = HandlerRegistry::new().register(action_types::PLACE_CALL, Arc::new(NoopHandler));

        assert!(registry.get(action_types::PLACE_CALL).is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn registered_handler_runs() {
        let registry = HandlerRegistry::new().register(action_types::SEND_REMINDER, Arc::new(NoopHandler));
        let action = ScheduledAction::new(
            IncidentId::new(),
            action_types::SEND_REMINDER,
            Timestamp::now(),
            serde_json::json!({}),
        );

        let handler = registry.get(action_types::SEND_REMINDER).unwrap();
        assert!(handler.run(&action, Timestamp::now()).await.is_ok());
    }
}
