//! PostgreSQL implementation of GuardianStore.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::guardian::{GuardianLink, GuardianStatus};
use crate::ports::GuardianStore;

#[derive(Clone)]
pub struct PgGuardianStore {
    pool: PgPool,
}

impl PgGuardianStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuardianStore for PgGuardianStore {
    async fn active_links_for(&self, traveler: UserId) -> Result<Vec<GuardianLink>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT traveler_id, watcher_id, priority, ring_timeout_secs, max_retries,
                   retry_backoff_secs, chat_enabled, call_enabled, status, created_at
            FROM guardian_links
            WHERE traveler_id = $1 AND status = 'active'
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .bind(traveler.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch guardian links", e))?;

        rows.into_iter().map(row_to_link).collect()
    }

    async fn find_link(
        &self,
        traveler: UserId,
        watcher: UserId,
    ) -> Result<Option<GuardianLink>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT traveler_id, watcher_id, priority, ring_timeout_secs, max_retries,
                   retry_backoff_secs, chat_enabled, call_enabled, status, created_at
            FROM guardian_links
            WHERE traveler_id = $1 AND watcher_id = $2
            "#,
        )
        .bind(traveler.as_uuid())
        .bind(watcher.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch guardian link", e))?;

        row.map(row_to_link).transpose()
    }

    async fn upsert_link(&self, link: &GuardianLink) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO guardian_links (
                traveler_id, watcher_id, priority, ring_timeout_secs, max_retries,
                retry_backoff_secs, chat_enabled, call_enabled, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (traveler_id, watcher_id) DO UPDATE SET
                priority = EXCLUDED.priority,
                ring_timeout_secs = EXCLUDED.ring_timeout_secs,
                max_retries = EXCLUDED.max_retries,
                retry_backoff_secs = EXCLUDED.retry_backoff_secs,
                chat_enabled = EXCLUDED.chat_enabled,
                call_enabled = EXCLUDED.call_enabled,
                status = EXCLUDED.status
            "#,
        )
        .bind(link.traveler_id.as_uuid())
        .bind(link.watcher_id.as_uuid())
        .bind(link.priority as i32)
        .bind(link.ring_timeout_secs as i32)
        .bind(link.max_retries as i32)
        .bind(link.retry_backoff_secs as i32)
        .bind(link.chat_enabled)
        .bind(link.call_enabled)
        .bind(status_to_str(link.status))
        .bind(link.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to upsert guardian link", e))?;

        Ok(())
    }
}

fn status_to_str(status: GuardianStatus) -> &'static str {
    match status {
        GuardianStatus::Active => "active",
        GuardianStatus::Revoked => "revoked",
    }
}

fn str_to_status(s: &str) -> Result<GuardianStatus, DomainError> {
    match s {
        "active" => Ok(GuardianStatus::Active),
        "revoked" => Ok(GuardianStatus::Revoked),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid guardian status: {}", s),
        )),
    }
}

fn row_to_link(row: sqlx::postgres::PgRow) -> Result<GuardianLink, DomainError> {
    let traveler_id: uuid::Uuid = row
        .try_get("traveler_id")
        .map_err(|e| DomainError::database("Failed to get traveler_id", e))?;
    let watcher_id: uuid::Uuid = row
        .try_get("watcher_id")
        .map_err(|e| DomainError::database("Failed to get watcher_id", e))?;
    let priority: i32 = row
        .try_get("priority")
        .map_err(|e| DomainError::database("Failed to get priority", e))?;
    let ring_timeout_secs: i32 = row
        .try_get("ring_timeout_secs")
        .map_err(|e| DomainError::database("Failed to get ring_timeout_secs", e))?;
    let max_retries: i32 = row
        .try_get("max_retries")
        .map_err(|e| DomainError::database("Failed to get max_retries", e))?;
    let retry_backoff_secs: i32 = row
        .try_get("retry_backoff_secs")
        .map_err(|e| DomainError::database("Failed to get retry_backoff_secs", e))?;
    let chat_enabled: bool = row
        .try_get("chat_enabled")
        .map_err(|e| DomainError::database("Failed to get chat_enabled", e))?;
    let call_enabled: bool = row
        .try_get("call_enabled")
        .map_err(|e| DomainError::database("Failed to get call_enabled", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| DomainError::database("Failed to get status", e))?;
    let created_at: chrono::DateTime<chrono::Utc> = row
        .try_get("created_at")
        .map_err(|e| DomainError::database("Failed to get created_at", e))?;

    Ok(GuardianLink {
        traveler_id: UserId::from_uuid(traveler_id),
        watcher_id: UserId::from_uuid(watcher_id),
        priority: priority as u16,
        ring_timeout_secs: ring_timeout_secs as u32,
        max_retries: max_retries as u32,
        retry_backoff_secs: retry_backoff_secs as u32,
        chat_enabled,
        call_enabled,
        status: str_to_status(&status)?,
        created_at: Timestamp::from_datetime(created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_conversion_roundtrips() {
        for status in [GuardianStatus::Active, GuardianStatus::Revoked] {
            assert_eq!(str_to_status(status_to_str(status)).unwrap(), status);
        }
    }
}
