//! PostgreSQL implementation of UserStore.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{DomainError, PhoneNumber, Timestamp, UserId};
use crate::domain::user::User;
use crate::ports::UserStore;

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get(&self, id: UserId) -> Result<Option<User>, DomainError> {
        let row = sqlx::query(
            "SELECT id, chat_user_id, phone, display_name, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch user", e))?;

        row.map(row_to_user).transpose()
    }

    async fn find_by_chat_user_id(&self, chat_user_id: &str) -> Result<Option<User>, DomainError> {
        let row = sqlx::query(
            "SELECT id, chat_user_id, phone, display_name, created_at \
             FROM users WHERE chat_user_id = $1",
        )
        .bind(chat_user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch user by chat id", e))?;

        row.map(row_to_user).transpose()
    }

    async fn insert(&self, user: &User) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, chat_user_id, phone, display_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.chat_user_id.as_deref())
        .bind(user.phone.as_ref().map(|p| p.as_str()))
        .bind(&user.display_name)
        .bind(user.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to insert user", e))?;

        Ok(())
    }
}

fn row_to_user(row: sqlx::postgres::PgRow) -> Result<User, DomainError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| DomainError::database("Failed to get id", e))?;
    let chat_user_id: Option<String> = row
        .try_get("chat_user_id")
        .map_err(|e| DomainError::database("Failed to get chat_user_id", e))?;
    let phone: Option<String> = row
        .try_get("phone")
        .map_err(|e| DomainError::database("Failed to get phone", e))?;
    let display_name: String = row
        .try_get("display_name")
        .map_err(|e| DomainError::database("Failed to get display_name", e))?;
    let created_at: chrono::DateTime<chrono::Utc> = row
        .try_get("created_at")
        .map_err(|e| DomainError::database("Failed to get created_at", e))?;

    // Stored numbers are already normalized E.164; a parse failure here
    // means the row predates normalization and should surface loudly.
    let phone = phone
        .as_deref()
        .map(PhoneNumber::parse)
        .transpose()
        .map_err(|e| DomainError::database("Invalid stored phone", e))?;

    Ok(User {
        id: UserId::from_uuid(id),
        chat_user_id,
        phone,
        display_name,
        created_at: Timestamp::from_datetime(created_at),
    })
}
