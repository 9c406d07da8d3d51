//! PostgreSQL implementation of OutboxStore.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::domain::alert::AlertChannel;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{OutboxClaim, OutboxOp, OutboxRecord, OutboxStatus, OutboxStore};

#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, key: &str) -> Result<Option<OutboxRecord>, DomainError> {
        let row = sqlx::query(
            "SELECT idempotency_key, channel, payload, status, provider_message_id, \
                    attempts, last_error, created_at \
             FROM outbox_messages WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch outbox row", e))?;

        row.map(row_to_record).transpose()
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn claim_or_get(
        &self,
        key: &str,
        op: &OutboxOp,
        now: Timestamp,
    ) -> Result<OutboxClaim, DomainError> {
        let payload = serde_json::to_value(op)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO outbox_messages (
                idempotency_key, channel, payload, status, attempts, created_at
            ) VALUES ($1, $2, $3, 'pending', 0, $4)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(op.channel().as_str())
        .bind(&payload)
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to insert outbox row", e))?;

        let record = self.fetch(key).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                "Outbox row vanished between insert and read",
            )
        })?;

        if result.rows_affected() > 0 {
            Ok(OutboxClaim::Fresh(record))
        } else {
            Ok(OutboxClaim::Existing(record))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<OutboxRecord>, DomainError> {
        self.fetch(key).await
    }

    async fn mark_sent(
        &self,
        key: &str,
        provider_message_id: Option<&str>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE outbox_messages SET status = 'sent', provider_message_id = $2, \
                    attempts = attempts + 1, last_error = NULL \
             WHERE idempotency_key = $1",
        )
        .bind(key)
        .bind(provider_message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to mark outbox row sent", e))?;

        Ok(())
    }

    async fn mark_failed(&self, key: &str, error: &str) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE outbox_messages SET status = 'failed', attempts = attempts + 1, \
                    last_error = $2 \
             WHERE idempotency_key = $1 AND status <> 'sent'",
        )
        .bind(key)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to mark outbox row failed", e))?;

        Ok(())
    }
}

fn str_to_status(s: &str) -> Result<OutboxStatus, DomainError> {
    match s {
        "pending" => Ok(OutboxStatus::Pending),
        "sent" => Ok(OutboxStatus::Sent),
        "failed" => Ok(OutboxStatus::Failed),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid outbox status: {}", s),
        )),
    }
}

fn str_to_channel(s: &str) -> Result<AlertChannel, DomainError> {
    match s {
        "chat" => Ok(AlertChannel::Chat),
        "voice" => Ok(AlertChannel::Voice),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid outbox channel: {}", s),
        )),
    }
}

fn row_to_record(row: sqlx::postgres::PgRow) -> Result<OutboxRecord, DomainError> {
    let key: String = row
        .try_get("idempotency_key")
        .map_err(|e| DomainError::database("Failed to get idempotency_key", e))?;
    let channel: String = row
        .try_get("channel")
        .map_err(|e| DomainError::database("Failed to get channel", e))?;
    let payload: Value = row
        .try_get("payload")
        .map_err(|e| DomainError::database("Failed to get payload", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| DomainError::database("Failed to get status", e))?;
    let provider_message_id: Option<String> = row
        .try_get("provider_message_id")
        .map_err(|e| DomainError::database("Failed to get provider_message_id", e))?;
    let attempts: i32 = row
        .try_get("attempts")
        .map_err(|e| DomainError::database("Failed to get attempts", e))?;
    let last_error: Option<String> = row
        .try_get("last_error")
        .map_err(|e| DomainError::database("Failed to get last_error", e))?;
    let created_at: chrono::DateTime<chrono::Utc> = row
        .try_get("created_at")
        .map_err(|e| DomainError::database("Failed to get created_at", e))?;

    let op: OutboxOp = serde_json::from_value(payload)
        .map_err(|e| DomainError::database("Invalid outbox payload", e))?;

    Ok(OutboxRecord {
        key,
        channel: str_to_channel(&channel)?,
        op,
        status: str_to_status(&status)?,
        provider_message_id,
        attempts: attempts as u32,
        last_error,
        created_at: Timestamp::from_datetime(created_at),
    })
}
