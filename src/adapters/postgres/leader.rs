//! Scheduler leader gate over a session-level Postgres advisory lock.
//!
//! The deployment runs one scheduler replica; this gate is the backstop
//! against an accidental second one. The first runner to take the lock
//! keeps it for the lifetime of its dedicated connection; any other
//! runner sees `false` and idles.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex;

use crate::application::scheduler::LeaderGate;

/// Well-known advisory lock key for scheduler leadership.
const LEADER_LOCK_KEY: i64 = 0x70_72_6f_74_65_63_74; // "protect"

pub struct PgLeaderGate {
    pool: PgPool,
    /// The connection holding the session lock. Dropping it releases
    /// leadership.
    holder: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PgLeaderGate {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            holder: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LeaderGate for PgLeaderGate {
    async fn is_leader(&self) -> bool {
        let mut holder = self.holder.lock().await;

        // Verify the held connection is still alive; a dropped connection
        // silently released the lock.
        if let Some(conn) = holder.as_mut() {
            match sqlx::query("SELECT 1").execute(&mut **conn).await {
                Ok(_) => return true,
                Err(e) => {
                    tracing::warn!(error = %e, "leader connection lost, re-acquiring");
                    *holder = None;
                }
            }
        }

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "cannot acquire connection for leader lock");
                return false;
            }
        };

        let locked: Result<(bool,), _> = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(LEADER_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await;

        match locked {
            Ok((true,)) => {
                tracing::info!("acquired scheduler leadership");
                *holder = Some(conn);
                true
            }
            Ok((false,)) => false,
            Err(e) => {
                tracing::error!(error = %e, "leader lock query failed");
                false
            }
        }
    }
}
