//! Liveness and readiness probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

/// Readiness check behind `/health/ready`.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn ready(&self) -> bool;
}

/// Database + scheduler readiness.
pub struct PgReadiness {
    pool: PgPool,
    scheduler_started: Arc<AtomicBool>,
    scheduler_enabled: bool,
}

impl PgReadiness {
    pub fn new(pool: PgPool, scheduler_started: Arc<AtomicBool>, scheduler_enabled: bool) -> Self {
        Self {
            pool,
            scheduler_started,
            scheduler_enabled,
        }
    }
}

#[async_trait]
impl ReadinessProbe for PgReadiness {
    async fn ready(&self) -> bool {
        if self.scheduler_enabled && !self.scheduler_started.load(Ordering::SeqCst) {
            return false;
        }
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Probe for tests and in-memory runs.
pub struct AlwaysReady;

#[async_trait]
impl ReadinessProbe for AlwaysReady {
    async fn ready(&self) -> bool {
        true
    }
}
