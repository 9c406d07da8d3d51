//! PostgreSQL implementation of InboxStore.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{InboxEvent, InboxOutcome, InboxStore};

#[derive(Clone)]
pub struct PgInboxStore {
    pool: PgPool,
}

impl PgInboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxStore for PgInboxStore {
    async fn record(
        &self,
        provider: &str,
        event_id: &str,
        payload: &Value,
        now: Timestamp,
    ) -> Result<InboxOutcome, DomainError> {
        // The primary key (provider, event_id) turns redelivery into a
        // conflict, not an error.
        let result = sqlx::query(
            r#"
            INSERT INTO inbox_events (provider, event_id, payload, received_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(payload)
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to record inbox event", e))?;

        if result.rows_affected() > 0 {
            Ok(InboxOutcome::Fresh)
        } else {
            Ok(InboxOutcome::Duplicate)
        }
    }

    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE inbox_events SET processed_at = $3 \
             WHERE provider = $1 AND event_id = $2 AND processed_at IS NULL",
        )
        .bind(provider)
        .bind(event_id)
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to mark inbox event processed", e))?;

        Ok(())
    }

    async fn unprocessed_before(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<InboxEvent>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT provider, event_id, payload, received_at, processed_at
            FROM inbox_events
            WHERE processed_at IS NULL AND received_at < $1
            ORDER BY received_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff.as_datetime())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list unprocessed events", e))?;

        rows.into_iter()
            .map(|row| {
                let provider: String = row
                    .try_get("provider")
                    .map_err(|e| DomainError::database("Failed to get provider", e))?;
                let event_id: String = row
                    .try_get("event_id")
                    .map_err(|e| DomainError::database("Failed to get event_id", e))?;
                let payload: Value = row
                    .try_get("payload")
                    .map_err(|e| DomainError::database("Failed to get payload", e))?;
                let received_at: chrono::DateTime<chrono::Utc> = row
                    .try_get("received_at")
                    .map_err(|e| DomainError::database("Failed to get received_at", e))?;
                let processed_at: Option<chrono::DateTime<chrono::Utc>> = row
                    .try_get("processed_at")
                    .map_err(|e| DomainError::database("Failed to get processed_at", e))?;

                Ok(InboxEvent {
                    provider,
                    event_id,
                    payload,
                    received_at: Timestamp::from_datetime(received_at),
                    processed_at: processed_at.map(Timestamp::from_datetime),
                })
            })
            .collect()
    }
}
