//! User store port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::user::User;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<User>, DomainError>;

    /// Looks a user up by their chat-provider id.
    async fn find_by_chat_user_id(&self, chat_user_id: &str) -> Result<Option<User>, DomainError>;

    async fn insert(&self, user: &User) -> Result<(), DomainError>;
}
