//! PostgreSQL implementation of ScheduledActionStore.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` inside an UPDATE..RETURNING so
//! concurrent claimers never receive the same row, and the state flip to
//! `running` happens atomically with the claim.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{
    DomainError, ErrorCode, IncidentId, ScheduledActionId, Timestamp,
};
use crate::ports::{ActionState, ScheduledAction, ScheduledActionStore};

#[derive(Clone)]
pub struct PgScheduledActionStore {
    pool: PgPool,
}

impl PgScheduledActionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduledActionStore for PgScheduledActionStore {
    async fn schedule(&self, action: &ScheduledAction) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_actions (
                id, incident_id, action_type, run_at, state, payload, attempts
            ) VALUES ($1, $2, $3, $4, 'scheduled', $5, $6)
            "#,
        )
        .bind(action.id.as_uuid())
        .bind(action.incident_id.as_uuid())
        .bind(&action.action_type)
        .bind(action.run_at.as_datetime())
        .bind(&action.payload)
        .bind(action.attempts as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to schedule action", e))?;

        Ok(())
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<ScheduledAction>, DomainError> {
        let rows = sqlx::query(
            r#"
            UPDATE scheduled_actions
            SET state = 'running'
            WHERE id IN (
                SELECT id FROM scheduled_actions
                WHERE state = 'scheduled' AND run_at <= $1
                ORDER BY run_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, incident_id, action_type, run_at, state, payload, attempts, last_error
            "#,
        )
        .bind(now.as_datetime())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to claim due actions", e))?;

        rows.into_iter().map(row_to_action).collect()
    }

    async fn mark_done(&self, id: ScheduledActionId) -> Result<(), DomainError> {
        sqlx::query("UPDATE scheduled_actions SET state = 'done' WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to mark action done", e))?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: ScheduledActionId,
        error: &str,
        attempts: u32,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE scheduled_actions SET state = 'failed', last_error = $2, attempts = $3 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .bind(attempts as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to mark action failed", e))?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: ScheduledActionId,
        run_at: Timestamp,
        attempts: u32,
        error: &str,
    ) -> Result<(), DomainError> {
        // Only a running action may go back to scheduled; an action
        // canceled by a terminal transition stays canceled.
        sqlx::query(
            "UPDATE scheduled_actions \
             SET state = 'scheduled', run_at = $2, attempts = $3, last_error = $4 \
             WHERE id = $1 AND state = 'running'",
        )
        .bind(id.as_uuid())
        .bind(run_at.as_datetime())
        .bind(attempts as i32)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to reschedule action", e))?;

        Ok(())
    }

    async fn cancel_for_incident(&self, incident: IncidentId) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "UPDATE scheduled_actions SET state = 'canceled' \
             WHERE incident_id = $1 AND state = 'scheduled'",
        )
        .bind(incident.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to cancel actions", e))?;

        Ok(result.rows_affected())
    }

    async fn count_scheduled_for(&self, incident: IncidentId) -> Result<u64, DomainError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scheduled_actions WHERE incident_id = $1 AND state = 'scheduled'",
        )
        .bind(incident.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to count scheduled actions", e))?;

        Ok(count as u64)
    }
}

fn str_to_state(s: &str) -> Result<ActionState, DomainError> {
    match s {
        "scheduled" => Ok(ActionState::Scheduled),
        "running" => Ok(ActionState::Running),
        "done" => Ok(ActionState::Done),
        "canceled" => Ok(ActionState::Canceled),
        "failed" => Ok(ActionState::Failed),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid action state: {}", s),
        )),
    }
}

fn row_to_action(row: sqlx::postgres::PgRow) -> Result<ScheduledAction, DomainError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| DomainError::database("Failed to get id", e))?;
    let incident_id: uuid::Uuid = row
        .try_get("incident_id")
        .map_err(|e| DomainError::database("Failed to get incident_id", e))?;
    let action_type: String = row
        .try_get("action_type")
        .map_err(|e| DomainError::database("Failed to get action_type", e))?;
    let run_at: chrono::DateTime<chrono::Utc> = row
        .try_get("run_at")
        .map_err(|e| DomainError::database("Failed to get run_at", e))?;
    let state: String = row
        .try_get("state")
        .map_err(|e| DomainError::database("Failed to get state", e))?;
    let payload: Value = row
        .try_get("payload")
        .map_err(|e| DomainError::database("Failed to get payload", e))?;
    let attempts: i32 = row
        .try_get("attempts")
        .map_err(|e| DomainError::database("Failed to get attempts", e))?;
    let last_error: Option<String> = row
        .try_get("last_error")
        .map_err(|e| DomainError::database("Failed to get last_error", e))?;

    Ok(ScheduledAction {
        id: ScheduledActionId::from_uuid(id),
        incident_id: IncidentId::from_uuid(incident_id),
        action_type,
        run_at: Timestamp::from_datetime(run_at),
        state: str_to_state(&state)?,
        payload,
        attempts: attempts as u32,
        last_error,
    })
}
