//! PostgreSQL implementation of IncidentStore.
//!
//! Terminal transitions take a per-incident advisory lock
//! (`pg_try_advisory_xact_lock` over a hash of the incident id) inside
//! the transaction that flips the status and cancels the incident's
//! scheduled actions. Lock acquisition is non-blocking with a short
//! retry window; running out of the window surfaces as `Contended`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{DomainError, ErrorCode, IncidentId, Timestamp, UserId};
use crate::domain::incident::{AckChannel, Incident, IncidentStatus};
use crate::ports::{IncidentStore, TerminalOutcome};

/// Namespace mixed into the advisory lock hash so incident locks cannot
/// collide with other advisory users of the same database.
const LOCK_NAMESPACE: i64 = 0x70_67_69; // "pgi"

/// Total time spent retrying lock acquisition before reporting
/// contention.
const LOCK_RETRY_WINDOW: Duration = Duration::from_secs(2);

/// Pause between lock attempts.
const LOCK_RETRY_PAUSE: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct PgIncidentStore {
    pool: PgPool,
}

impl PgIncidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs one terminal-transition transaction attempt. Returns `None`
    /// when the advisory lock was unavailable.
    async fn try_terminal<F>(
        &self,
        id: IncidentId,
        transition: F,
    ) -> Result<Option<TerminalOutcome>, DomainError>
    where
        F: FnOnce(&mut Incident) -> Result<(), DomainError>,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        let (locked,): (bool,) =
            sqlx::query_as("SELECT pg_try_advisory_xact_lock(hashtextextended($1, $2))")
                .bind(id.to_string())
                .bind(LOCK_NAMESPACE)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| DomainError::database("Failed to take incident lock", e))?;

        if !locked {
            tx.rollback().await.ok();
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            SELECT id, traveler_id, status, created_at,
                   acknowledged_at, acknowledged_by, acknowledged_via, canceled_at
            FROM incidents
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DomainError::database("Failed to fetch incident", e))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Err(DomainError::new(
                ErrorCode::IncidentNotFound,
                format!("Incident not found: {}", id),
            ));
        };

        let mut incident = row_to_incident(row)?;

        if incident.is_terminal() {
            tx.rollback().await.ok();
            return Ok(Some(TerminalOutcome::AlreadyTerminal(incident)));
        }

        transition(&mut incident)?;

        sqlx::query(
            r#"
            UPDATE incidents SET
                status = $2,
                acknowledged_at = $3,
                acknowledged_by = $4,
                acknowledged_via = $5,
                canceled_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(status_to_str(incident.status))
        .bind(incident.acknowledged_at.map(|t| *t.as_datetime()))
        .bind(incident.acknowledged_by.map(|u| *u.as_uuid()))
        .bind(incident.acknowledged_via.map(ack_channel_to_str))
        .bind(incident.canceled_at.map(|t| *t.as_datetime()))
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::database("Failed to update incident", e))?;

        // Same transaction: a terminal incident never has live actions.
        sqlx::query(
            "UPDATE scheduled_actions SET state = 'canceled' \
             WHERE incident_id = $1 AND state = 'scheduled'",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::database("Failed to cancel scheduled actions", e))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit terminal transition", e))?;

        Ok(Some(TerminalOutcome::Applied(incident)))
    }

    /// Retries `try_terminal` within the lock window.
    async fn terminal_with_retry<F>(
        &self,
        id: IncidentId,
        mut transition: F,
    ) -> Result<TerminalOutcome, DomainError>
    where
        F: FnMut(&mut Incident) -> Result<(), DomainError>,
    {
        let deadline = Instant::now() + LOCK_RETRY_WINDOW;
        loop {
            if let Some(outcome) = self.try_terminal(id, &mut transition).await? {
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                return Ok(TerminalOutcome::Contended);
            }
            tokio::time::sleep(LOCK_RETRY_PAUSE).await;
        }
    }
}

#[async_trait]
impl IncidentStore for PgIncidentStore {
    async fn create(&self, incident: &Incident) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO incidents (id, traveler_id, status, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(incident.id.as_uuid())
        .bind(incident.traveler_id.as_uuid())
        .bind(status_to_str(incident.status))
        .bind(incident.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to insert incident", e))?;

        Ok(())
    }

    async fn get(&self, id: IncidentId) -> Result<Option<Incident>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, traveler_id, status, created_at,
                   acknowledged_at, acknowledged_by, acknowledged_via, canceled_at
            FROM incidents
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch incident", e))?;

        row.map(row_to_incident).transpose()
    }

    async fn acknowledge(
        &self,
        id: IncidentId,
        by: UserId,
        via: AckChannel,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError> {
        self.terminal_with_retry(id, |incident| incident.acknowledge(by, via, now))
            .await
    }

    async fn cancel(
        &self,
        id: IncidentId,
        _by: UserId,
        now: Timestamp,
    ) -> Result<TerminalOutcome, DomainError> {
        self.terminal_with_retry(id, |incident| incident.cancel(now))
            .await
    }
}

// ════════════════════════════════════════════════════════════════════
// Helper functions
// ════════════════════════════════════════════════════════════════════

fn status_to_str(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Open => "open",
        IncidentStatus::Acknowledged => "acknowledged",
        IncidentStatus::Canceled => "canceled",
    }
}

fn str_to_status(s: &str) -> Result<IncidentStatus, DomainError> {
    match s {
        "open" => Ok(IncidentStatus::Open),
        "acknowledged" => Ok(IncidentStatus::Acknowledged),
        "canceled" => Ok(IncidentStatus::Canceled),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid incident status: {}", s),
        )),
    }
}

fn ack_channel_to_str(via: AckChannel) -> &'static str {
    match via {
        AckChannel::ChatButton => "chat_button",
        AckChannel::Dtmf => "dtmf",
    }
}

fn str_to_ack_channel(s: &str) -> Result<AckChannel, DomainError> {
    match s {
        "chat_button" => Ok(AckChannel::ChatButton),
        "dtmf" => Ok(AckChannel::Dtmf),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid ack channel: {}", s),
        )),
    }
}

fn row_to_incident(row: sqlx::postgres::PgRow) -> Result<Incident, DomainError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| DomainError::database("Failed to get id", e))?;
    let traveler_id: uuid::Uuid = row
        .try_get("traveler_id")
        .map_err(|e| DomainError::database("Failed to get traveler_id", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| DomainError::database("Failed to get status", e))?;
    let created_at: chrono::DateTime<chrono::Utc> = row
        .try_get("created_at")
        .map_err(|e| DomainError::database("Failed to get created_at", e))?;
    let acknowledged_at: Option<chrono::DateTime<chrono::Utc>> = row
        .try_get("acknowledged_at")
        .map_err(|e| DomainError::database("Failed to get acknowledged_at", e))?;
    let acknowledged_by: Option<uuid::Uuid> = row
        .try_get("acknowledged_by")
        .map_err(|e| DomainError::database("Failed to get acknowledged_by", e))?;
    let acknowledged_via: Option<String> = row
        .try_get("acknowledged_via")
        .map_err(|e| DomainError::database("Failed to get acknowledged_via", e))?;
    let canceled_at: Option<chrono::DateTime<chrono::Utc>> = row
        .try_get("canceled_at")
        .map_err(|e| DomainError::database("Failed to get canceled_at", e))?;

    Ok(Incident {
        id: IncidentId::from_uuid(id),
        traveler_id: UserId::from_uuid(traveler_id),
        status: str_to_status(&status)?,
        created_at: Timestamp::from_datetime(created_at),
        acknowledged_at: acknowledged_at.map(Timestamp::from_datetime),
        acknowledged_by: acknowledged_by.map(UserId::from_uuid),
        acknowledged_via: acknowledged_via
            .as_deref()
            .map(str_to_ack_channel)
            .transpose()?,
        canceled_at: canceled_at.map(Timestamp::from_datetime),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_conversion_roundtrips() {
        for status in [
            IncidentStatus::Open,
            IncidentStatus::Acknowledged,
            IncidentStatus::Canceled,
        ] {
            assert_eq!(str_to_status(status_to_str(status)).unwrap(), status);
        }
    }

    #[test]
    fn ack_channel_conversion_roundtrips() {
        for via in [AckChannel::ChatButton, AckChannel::Dtmf] {
            assert_eq!(str_to_ack_channel(ack_channel_to_str(via)).unwrap(), via);
        }
    }

    #[test]
    fn invalid_status_is_rejected() {
        assert!(str_to_status("paused").is_err());
    }
}
