//! PostgreSQL implementations of AlertStore and CallAttemptStore.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::alert::{Alert, AlertChannel, AlertStatus, CallAttempt, CallResult};
use crate::domain::foundation::{
    AlertId, CallAttemptId, DomainError, ErrorCode, IncidentId, Timestamp, UserId,
};
use crate::ports::{AlertStore, BeginAttempt, CallAttemptStore};

#[derive(Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn insert_if_absent(&self, alert: &Alert) -> Result<Alert, DomainError> {
        // ON CONFLICT DO NOTHING then re-read: either way the caller gets
        // the stored row for this (incident, audience, channel).
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, incident_id, audience_id, channel, status, attempts, last_error, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (incident_id, audience_id, channel) DO NOTHING
            "#,
        )
        .bind(alert.id.as_uuid())
        .bind(alert.incident_id.as_uuid())
        .bind(alert.audience_id.as_uuid())
        .bind(alert.channel.as_str())
        .bind(alert_status_to_str(alert.status))
        .bind(alert.attempts as i32)
        .bind(alert.last_error.as_deref())
        .bind(alert.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to insert alert", e))?;

        self.find(alert.incident_id, alert.audience_id, alert.channel)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    "Alert vanished between insert and read",
                )
            })
    }

    async fn get(&self, id: AlertId) -> Result<Option<Alert>, DomainError> {
        let row = sqlx::query(
            "SELECT id, incident_id, audience_id, channel, status, attempts, last_error, created_at \
             FROM alerts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch alert", e))?;

        row.map(row_to_alert).transpose()
    }

    async fn find(
        &self,
        incident: IncidentId,
        audience: UserId,
        channel: AlertChannel,
    ) -> Result<Option<Alert>, DomainError> {
        let row = sqlx::query(
            "SELECT id, incident_id, audience_id, channel, status, attempts, last_error, created_at \
             FROM alerts WHERE incident_id = $1 AND audience_id = $2 AND channel = $3",
        )
        .bind(incident.as_uuid())
        .bind(audience.as_uuid())
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to find alert", e))?;

        row.map(row_to_alert).transpose()
    }

    async fn list_for_incident(&self, incident: IncidentId) -> Result<Vec<Alert>, DomainError> {
        let rows = sqlx::query(
            "SELECT id, incident_id, audience_id, channel, status, attempts, last_error, created_at \
             FROM alerts WHERE incident_id = $1 ORDER BY created_at ASC",
        )
        .bind(incident.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list alerts", e))?;

        rows.into_iter().map(row_to_alert).collect()
    }

    async fn update(&self, alert: &Alert) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE alerts SET status = $2, attempts = $3, last_error = $4 WHERE id = $1",
        )
        .bind(alert.id.as_uuid())
        .bind(alert_status_to_str(alert.status))
        .bind(alert.attempts as i32)
        .bind(alert.last_error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to update alert", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::AlertNotFound,
                format!("Alert not found: {}", alert.id),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgCallAttemptStore {
    pool: PgPool,
}

impl PgCallAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallAttemptStore for PgCallAttemptStore {
    async fn begin(&self, attempt: &CallAttempt) -> Result<BeginAttempt, DomainError> {
        // The partial unique index on (alert_id) WHERE ended_at IS NULL
        // turns a concurrent second pending attempt into a conflict.
        let inserted = sqlx::query(
            r#"
            INSERT INTO call_attempts (
                id, alert_id, provider_call_id, attempt_no, result,
                dtmf_received, started_at, ended_at, error_code
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(attempt.id.as_uuid())
        .bind(attempt.alert_id.as_uuid())
        .bind(attempt.provider_call_id.as_deref())
        .bind(attempt.attempt_no as i32)
        .bind(result_to_str(attempt.result))
        .bind(attempt.dtmf_received.map(|c| c.to_string()))
        .bind(attempt.started_at.as_datetime())
        .bind(attempt.ended_at.map(|t| *t.as_datetime()))
        .bind(attempt.error_code.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to insert call attempt", e))?;

        if inserted.rows_affected() > 0 {
            return Ok(BeginAttempt::Started(attempt.clone()));
        }

        let pending = sqlx::query(
            "SELECT id, alert_id, provider_call_id, attempt_no, result, \
                    dtmf_received, started_at, ended_at, error_code \
             FROM call_attempts WHERE alert_id = $1 AND ended_at IS NULL",
        )
        .bind(attempt.alert_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch pending attempt", e))?;

        if let Some(row) = pending {
            return Ok(BeginAttempt::AlreadyPending(row_to_attempt(row)?));
        }

        // Conflict on (alert_id, attempt_no): this attempt number already
        // ran to completion. Hand back the settled row.
        let settled = sqlx::query(
            "SELECT id, alert_id, provider_call_id, attempt_no, result, \
                    dtmf_received, started_at, ended_at, error_code \
             FROM call_attempts WHERE alert_id = $1 AND attempt_no = $2",
        )
        .bind(attempt.alert_id.as_uuid())
        .bind(attempt.attempt_no as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch settled attempt", e))?;

        match settled {
            Some(row) => Ok(BeginAttempt::AlreadyPending(row_to_attempt(row)?)),
            None => Err(DomainError::new(
                ErrorCode::AttemptAlreadyPending,
                "Attempt insert conflicted but no matching attempt found",
            )),
        }
    }

    async fn get(&self, id: CallAttemptId) -> Result<Option<CallAttempt>, DomainError> {
        let row = sqlx::query(
            "SELECT id, alert_id, provider_call_id, attempt_no, result, \
                    dtmf_received, started_at, ended_at, error_code \
             FROM call_attempts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch call attempt", e))?;

        row.map(row_to_attempt).transpose()
    }

    async fn update(&self, attempt: &CallAttempt) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE call_attempts SET
                provider_call_id = $2,
                result = $3,
                dtmf_received = $4,
                ended_at = $5,
                error_code = $6
            WHERE id = $1
            "#,
        )
        .bind(attempt.id.as_uuid())
        .bind(attempt.provider_call_id.as_deref())
        .bind(result_to_str(attempt.result))
        .bind(attempt.dtmf_received.map(|c| c.to_string()))
        .bind(attempt.ended_at.map(|t| *t.as_datetime()))
        .bind(attempt.error_code.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to update call attempt", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::AttemptNotFound,
                format!("Call attempt not found: {}", attempt.id),
            ));
        }
        Ok(())
    }

    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallAttempt>, DomainError> {
        let row = sqlx::query(
            "SELECT id, alert_id, provider_call_id, attempt_no, result, \
                    dtmf_received, started_at, ended_at, error_code \
             FROM call_attempts WHERE provider_call_id = $1",
        )
        .bind(provider_call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch attempt by call id", e))?;

        row.map(row_to_attempt).transpose()
    }

    async fn list_for_alert(&self, alert: AlertId) -> Result<Vec<CallAttempt>, DomainError> {
        let rows = sqlx::query(
            "SELECT id, alert_id, provider_call_id, attempt_no, result, \
                    dtmf_received, started_at, ended_at, error_code \
             FROM call_attempts WHERE alert_id = $1 ORDER BY attempt_no ASC",
        )
        .bind(alert.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list attempts", e))?;

        rows.into_iter().map(row_to_attempt).collect()
    }

    async fn unsettled_for_incident(
        &self,
        incident: IncidentId,
    ) -> Result<Vec<CallAttempt>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT ca.id, ca.alert_id, ca.provider_call_id, ca.attempt_no, ca.result,
                   ca.dtmf_received, ca.started_at, ca.ended_at, ca.error_code
            FROM call_attempts ca
            JOIN alerts a ON a.id = ca.alert_id
            WHERE a.incident_id = $1 AND ca.ended_at IS NULL
            "#,
        )
        .bind(incident.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list unsettled attempts", e))?;

        rows.into_iter().map(row_to_attempt).collect()
    }

    async fn total_ring_secs(&self, alert: AlertId) -> Result<u32, DomainError> {
        let (total,): (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(EXTRACT(EPOCH FROM (ended_at - started_at))) \
             FROM call_attempts WHERE alert_id = $1 AND ended_at IS NOT NULL",
        )
        .bind(alert.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to sum ring time", e))?;

        Ok(total.unwrap_or(0.0).max(0.0) as u32)
    }
}

// ════════════════════════════════════════════════════════════════════
// Helper functions
// ════════════════════════════════════════════════════════════════════

fn alert_status_to_str(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Pending => "pending",
        AlertStatus::Sent => "sent",
        AlertStatus::Delivered => "delivered",
        AlertStatus::Failed => "failed",
        AlertStatus::Halted => "halted",
    }
}

fn str_to_alert_status(s: &str) -> Result<AlertStatus, DomainError> {
    match s {
        "pending" => Ok(AlertStatus::Pending),
        "sent" => Ok(AlertStatus::Sent),
        "delivered" => Ok(AlertStatus::Delivered),
        "failed" => Ok(AlertStatus::Failed),
        "halted" => Ok(AlertStatus::Halted),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid alert status: {}", s),
        )),
    }
}

fn str_to_channel(s: &str) -> Result<AlertChannel, DomainError> {
    match s {
        "chat" => Ok(AlertChannel::Chat),
        "voice" => Ok(AlertChannel::Voice),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid alert channel: {}", s),
        )),
    }
}

fn result_to_str(result: CallResult) -> &'static str {
    match result {
        CallResult::Pending => "pending",
        CallResult::Ringing => "ringing",
        CallResult::AnsweredHuman => "answered_human",
        CallResult::AnsweredMachine => "answered_machine",
        CallResult::NoAnswer => "no_answer",
        CallResult::Busy => "busy",
        CallResult::Failed => "failed",
        CallResult::Acknowledged => "acknowledged",
    }
}

fn str_to_result(s: &str) -> Result<CallResult, DomainError> {
    match s {
        "pending" => Ok(CallResult::Pending),
        "ringing" => Ok(CallResult::Ringing),
        "answered_human" => Ok(CallResult::AnsweredHuman),
        "answered_machine" => Ok(CallResult::AnsweredMachine),
        "no_answer" => Ok(CallResult::NoAnswer),
        "busy" => Ok(CallResult::Busy),
        "failed" => Ok(CallResult::Failed),
        "acknowledged" => Ok(CallResult::Acknowledged),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid call result: {}", s),
        )),
    }
}

fn row_to_alert(row: sqlx::postgres::PgRow) -> Result<Alert, DomainError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| DomainError::database("Failed to get id", e))?;
    let incident_id: uuid::Uuid = row
        .try_get("incident_id")
        .map_err(|e| DomainError::database("Failed to get incident_id", e))?;
    let audience_id: uuid::Uuid = row
        .try_get("audience_id")
        .map_err(|e| DomainError::database("Failed to get audience_id", e))?;
    let channel: String = row
        .try_get("channel")
        .map_err(|e| DomainError::database("Failed to get channel", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| DomainError::database("Failed to get status", e))?;
    let attempts: i32 = row
        .try_get("attempts")
        .map_err(|e| DomainError::database("Failed to get attempts", e))?;
    let last_error: Option<String> = row
        .try_get("last_error")
        .map_err(|e| DomainError::database("Failed to get last_error", e))?;
    let created_at: chrono::DateTime<chrono::Utc> = row
        .try_get("created_at")
        .map_err(|e| DomainError::database("Failed to get created_at", e))?;

    Ok(Alert {
        id: AlertId::from_uuid(id),
        incident_id: IncidentId::from_uuid(incident_id),
        audience_id: UserId::from_uuid(audience_id),
        channel: str_to_channel(&channel)?,
        status: str_to_alert_status(&status)?,
        attempts: attempts as u32,
        last_error,
        created_at: Timestamp::from_datetime(created_at),
    })
}

fn row_to_attempt(row: sqlx::postgres::PgRow) -> Result<CallAttempt, DomainError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| DomainError::database("Failed to get id", e))?;
    let alert_id: uuid::Uuid = row
        .try_get("alert_id")
        .map_err(|e| DomainError::database("Failed to get alert_id", e))?;
    let provider_call_id: Option<String> = row
        .try_get("provider_call_id")
        .map_err(|e| DomainError::database("Failed to get provider_call_id", e))?;
    let attempt_no: i32 = row
        .try_get("attempt_no")
        .map_err(|e| DomainError::database("Failed to get attempt_no", e))?;
    let result: String = row
        .try_get("result")
        .map_err(|e| DomainError::database("Failed to get result", e))?;
    let dtmf_received: Option<String> = row
        .try_get("dtmf_received")
        .map_err(|e| DomainError::database("Failed to get dtmf_received", e))?;
    let started_at: chrono::DateTime<chrono::Utc> = row
        .try_get("started_at")
        .map_err(|e| DomainError::database("Failed to get started_at", e))?;
    let ended_at: Option<chrono::DateTime<chrono::Utc>> = row
        .try_get("ended_at")
        .map_err(|e| DomainError::database("Failed to get ended_at", e))?;
    let error_code: Option<String> = row
        .try_get("error_code")
        .map_err(|e| DomainError::database("Failed to get error_code", e))?;

    Ok(CallAttempt {
        id: CallAttemptId::from_uuid(id),
        alert_id: AlertId::from_uuid(alert_id),
        provider_call_id,
        attempt_no: attempt_no as u32,
        result: str_to_result(&result)?,
        dtmf_received: dtmf_received.and_then(|s| s.chars().next()),
        started_at: Timestamp::from_datetime(started_at),
        ended_at: ended_at.map(Timestamp::from_datetime),
        error_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_status_conversion_roundtrips() {
        for status in [
            AlertStatus::Pending,
            AlertStatus::Sent,
            AlertStatus::Delivered,
            AlertStatus::Failed,
            AlertStatus::Halted,
        ] {
            assert_eq!(str_to_alert_status(alert_status_to_str(status)).unwrap(), status);
        }
    }

    #[test]
    fn call_result_conversion_roundtrips() {
        for result in [
            CallResult::Pending,
            CallResult::Ringing,
            CallResult::AnsweredHuman,
            CallResult::AnsweredMachine,
            CallResult::NoAnswer,
            CallResult::Busy,
            CallResult::Failed,
            CallResult::Acknowledged,
        ] {
            assert_eq!(str_to_result(result_to_str(result)).unwrap(), result);
        }
    }
}
