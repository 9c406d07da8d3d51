//! Scheduler runner: the single long-lived loop that claims due actions
//! and dispatches them to registered handlers.
//!
//! Deployment is a singleton, but the runner additionally gates each
//! claim burst on a database leader lock so an accidental second replica
//! idles instead of double-firing.
//!
//! ## Failure policy
//!
//! A handler error increments the action's attempt counter. Retryable
//! errors reschedule with exponential backoff (capped, jittered); anything
//! else, or hitting the retry ceiling, marks the action failed and bumps a
//! metric.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{ScheduledAction, ScheduledActionStore};

use super::registry::HandlerRegistry;

/// Split-brain guard. `true` means this process may claim actions.
#[async_trait]
pub trait LeaderGate: Send + Sync {
    async fn is_leader(&self) -> bool;
}

/// Leader gate for tests and singleton deployments without a database.
pub struct AlwaysLeader;

#[async_trait]
impl LeaderGate for AlwaysLeader {
    async fn is_leader(&self) -> bool {
        true
    }
}

/// Periodic work piggybacked on the poll loop; used for the inbox
/// unprocessed-event sweep, which is not incident-scoped and therefore
/// not a scheduled action.
#[async_trait]
pub trait InboxSweep: Send + Sync {
    async fn sweep(&self, now: Timestamp) -> Result<u32, DomainError>;
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to poll for due actions.
    pub poll_interval: Duration,
    /// Max actions claimed per poll.
    pub batch_size: u32,
    /// Retry ceiling per action.
    pub max_attempts: u32,
    /// Base of the exponential backoff.
    pub backoff_base_secs: u32,
    /// Backoff cap.
    pub backoff_max_secs: u32,
    /// Run the inbox sweep every Nth poll.
    pub sweep_every_polls: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 50,
            max_attempts: 5,
            backoff_base_secs: 2,
            backoff_max_secs: 300,
            sweep_every_polls: 10,
        }
    }
}

pub struct SchedulerRunner {
    store: Arc<dyn ScheduledActionStore>,
    registry: Arc<HandlerRegistry>,
    leader: Arc<dyn LeaderGate>,
    sweeper: Option<Arc<dyn InboxSweep>>,
    config: SchedulerConfig,
    started: Arc<AtomicBool>,
}

impl SchedulerRunner {
    pub fn new(
        store: Arc<dyn ScheduledActionStore>,
        registry: Arc<HandlerRegistry>,
        leader: Arc<dyn LeaderGate>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            leader,
            sweeper: None,
            config,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sweeper(mut self, sweeper: Arc<dyn InboxSweep>) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Readiness flag, flipped after the first completed poll.
    pub fn started_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.started)
    }

    /// Runs until the shutdown signal flips. Finishes the in-flight batch
    /// before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        let mut interval = time::interval(self.config.poll_interval);
        let mut polls: u32 = 0;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("scheduler shutting down, draining final batch");
                        self.poll_once(Timestamp::now()).await?;
                        return Ok(());
                    }
                }

                _ = interval.tick() => {
                    polls = polls.wrapping_add(1);
                    let now = Timestamp::now();
                    self.poll_once(now).await?;
                    self.started.store(true, Ordering::SeqCst);

                    if polls % self.config.sweep_every_polls == 0 {
                        self.sweep(now).await;
                    }
                }
            }
        }
    }

    /// Claims and dispatches one batch. Public for tests.
    pub async fn poll_once(&self, now: Timestamp) -> Result<usize, DomainError> {
        if !self.leader.is_leader().await {
            tracing::debug!("not the scheduler leader, idling");
            return Ok(0);
        }

        let due = self.store.claim_due(now, self.config.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        if let Some(oldest) = due.iter().map(|a| a.run_at).min() {
            metrics::gauge!("scheduler_lag_seconds").set(now.secs_since(&oldest) as f64);
        }

        let count = due.len();
        for action in due {
            self.dispatch(action, now).await;
        }

        Ok(count)
    }

    async fn dispatch(&self, action: ScheduledAction, now: Timestamp) {
        let Some(handler) = self.registry.get(&action.action_type) else {
            tracing::error!(
                action_id = %action.id,
                action_type = %action.action_type,
                "no handler registered"
            );
            let _ = self
                .store
                .mark_failed(action.id, "no handler registered", action.attempts + 1)
                .await;
            return;
        };

        match handler.run(&action, now).await {
            Ok(()) => {
                if let Err(e) = self.store.mark_done(action.id).await {
                    tracing::error!(action_id = %action.id, error = %e, "failed to mark action done");
                }
            }
            Err(e) => self.handle_failure(&action, &e, now).await,
        }
    }

    async fn handle_failure(&self, action: &ScheduledAction, error: &DomainError, now: Timestamp) {
        let attempts = action.attempts + 1;

        if !error.is_retryable() || attempts >= self.config.max_attempts {
            metrics::counter!(
                "scheduler_action_failed_total",
                "action" => action.action_type.clone()
            )
            .increment(1);
            tracing::error!(
                action_id = %action.id,
                action_type = %action.action_type,
                attempts,
                error = %error,
                "scheduled action failed terminally"
            );
            let _ = self
                .store
                .mark_failed(action.id, &error.to_string(), attempts)
                .await;
            return;
        }

        let delay = self.backoff_secs(attempts);
        tracing::warn!(
            action_id = %action.id,
            action_type = %action.action_type,
            attempts,
            delay_secs = delay,
            error = %error,
            "scheduled action failed, retrying"
        );
        let _ = self
            .store
            .reschedule(action.id, now.plus_secs(delay), attempts, &error.to_string())
            .await;
    }

    /// Exponential backoff with a cap and up to 50% jitter.
    fn backoff_secs(&self, attempts: u32) -> u32 {
        let exp = self
            .config
            .backoff_base_secs
            .saturating_mul(2u32.saturating_pow(attempts.saturating_sub(1)))
            .min(self.config.backoff_max_secs);
        let jitter = rand::thread_rng().gen_range(0..=exp / 2);
        exp + jitter
    }

    async fn sweep(&self, now: Timestamp) {
        if let Some(sweeper) = &self.sweeper {
            match sweeper.sweep(now).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "re-dispatched unprocessed inbox events"),
                Err(e) => tracing::error!(error = %e, "inbox sweep failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scheduler::{action_types, ActionHandler};
    use crate::domain::foundation::{ErrorCode, IncidentId};
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Mutex;

    /// Store stub that hands out one action and records outcomes.
    struct StubStore {
        due: Mutex<Vec<ScheduledAction>>,
        done: AtomicU32,
        failed: AtomicU32,
        rescheduled: AtomicU32,
    }

    impl StubStore {
        fn with_due(actions: Vec<ScheduledAction>) -> Self {
            Self {
                due: Mutex::new(actions),
                done: AtomicU32::new(0),
                failed: AtomicU32::new(0),
                rescheduled: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ScheduledActionStore for StubStore {
        async fn schedule(&self, _: &ScheduledAction) -> Result<(), DomainError> {
            Ok(())
        }

        async fn claim_due(
            &self,
            _: Timestamp,
            limit: u32,
        ) -> Result<Vec<ScheduledAction>, DomainError> {
            let mut due = self.due.lock().await;
            let take = due.len().min(limit as usize);
            Ok(due.drain(..take).collect())
        }

        async fn mark_done(&self, _: crate::domain::foundation::ScheduledActionId) -> Result<(), DomainError> {
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn mark_failed(
            &self,
            _: crate::domain::foundation::ScheduledActionId,
            _: &str,
            _: u32,
        ) -> Result<(), DomainError> {
            self.failed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reschedule(
            &self,
            _: crate::domain::foundation::ScheduledActionId,
            _: Timestamp,
            _: u32,
            _: &str,
        ) -> Result<(), DomainError> {
            self.rescheduled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn cancel_for_incident(&self, _: IncidentId) -> Result<u64, DomainError> {
            Ok(0)
        }

        async fn count_scheduled_for(&self, _: IncidentId) -> Result<u64, DomainError> {
            Ok(0)
        }
    }

    struct OkHandler;

    #[async_trait]
    impl ActionHandler for OkHandler {
        async fn run(&self, _: &ScheduledAction, _: Timestamp) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct TransientFailHandler;

    #[async_trait]
    impl ActionHandler for TransientFailHandler {
        async fn run(&self, _: &ScheduledAction, _: Timestamp) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::ProviderTransient, "timeout"))
        }
    }

    struct NotLeader;

    #[async_trait]
    impl LeaderGate for NotLeader {
        async fn is_leader(&self) -> bool {
            false
        }
    }

    fn action(action_type: &str) -> ScheduledAction {
        ScheduledAction::new(
            IncidentId::new(),
            action_type,
            Timestamp::from_unix_secs(0),
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn successful_action_is_marked_done() {
        let store = Arc::new(StubStore::with_due(vec![action(action_types::PLACE_CALL)]));
        let registry = Arc::new(
            HandlerRegistry::new().register(action_types::PLACE_CALL, Arc::new(OkHandler)),
        );
        let runner = SchedulerRunner::new(
            store.clone(),
            registry,
            Arc::new(AlwaysLeader),
            SchedulerConfig::default(),
        );

        let count = runner.poll_once(Timestamp::from_unix_secs(10)).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(store.done.load(Ordering::SeqCst), 1);
        assert_eq!(store.failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_rescheduled() {
        let store = Arc::new(StubStore::with_due(vec![action(action_types::PLACE_CALL)]));
        let registry = Arc::new(
            HandlerRegistry::new().register(action_types::PLACE_CALL, Arc::new(TransientFailHandler)),
        );
        let runner = SchedulerRunner::new(
            store.clone(),
            registry,
            Arc::new(AlwaysLeader),
            SchedulerConfig::default(),
        );

        runner.poll_once(Timestamp::from_unix_secs(10)).await.unwrap();

        assert_eq!(store.rescheduled.load(Ordering::SeqCst), 1);
        assert_eq!(store.failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_ceiling_marks_failed() {
        let mut exhausted = action(action_types::PLACE_CALL);
        exhausted.attempts = 4; // next failure is attempt 5 of 5

        let store = Arc::new(StubStore::with_due(vec![exhausted]));
        let registry = Arc::new(
            HandlerRegistry::new().register(action_types::PLACE_CALL, Arc::new(TransientFailHandler)),
        );
        let runner = SchedulerRunner::new(
            store.clone(),
            registry,
            Arc::new(AlwaysLeader),
            SchedulerConfig::default(),
        );

        runner.poll_once(Timestamp::from_unix_secs(10)).await.unwrap();

        assert_eq!(store.failed.load(Ordering::SeqCst), 1);
        assert_eq!(store.rescheduled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_action_type_fails_fast() {
        let store = Arc::new(StubStore::with_due(vec![action("mystery")]));
        let registry = Arc::new(HandlerRegistry::new());
        let runner = SchedulerRunner::new(
            store.clone(),
            registry,
            Arc::new(AlwaysLeader),
            SchedulerConfig::default(),
        );

        runner.poll_once(Timestamp::from_unix_secs(10)).await.unwrap();

        assert_eq!(store.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_leader_claims_nothing() {
        let store = Arc::new(StubStore::with_due(vec![action(action_types::PLACE_CALL)]));
        let registry = Arc::new(
            HandlerRegistry::new().register(action_types::PLACE_CALL, Arc::new(OkHandler)),
        );
        let runner = SchedulerRunner::new(
            store.clone(),
            registry,
            Arc::new(NotLeader),
            SchedulerConfig::default(),
        );

        let count = runner.poll_once(Timestamp::from_unix_secs(10)).await.unwrap();

        assert_eq!(count, 0);
        assert_eq!(store.done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = Arc::new(StubStore::with_due(vec![]));
        let registry = Arc::new(HandlerRegistry::new());
        let config = SchedulerConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let runner = Arc::new(SchedulerRunner::new(
            store,
            registry,
            Arc::new(AlwaysLeader),
            config,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(runner.started_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let runner = SchedulerRunner::new(
            Arc::new(StubStore::with_due(vec![])),
            Arc::new(HandlerRegistry::new()),
            Arc::new(AlwaysLeader),
            SchedulerConfig {
                backoff_base_secs: 2,
                backoff_max_secs: 60,
                ..Default::default()
            },
        );

        // attempt 1: 2s base, jitter <= 1s
        let b1 = runner.backoff_secs(1);
        assert!((2..=3).contains(&b1));

        // attempt 10 would be 1024s, capped at 60 plus jitter <= 30
        let b10 = runner.backoff_secs(10);
        assert!((60..=90).contains(&b10));
    }
}
