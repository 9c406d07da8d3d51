//! Guardian link store port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::guardian::GuardianLink;

#[async_trait]
pub trait GuardianStore: Send + Sync {
    /// Active links for one traveler, sorted into cascade contact order
    /// (priority ascending, link creation time ascending).
    async fn active_links_for(&self, traveler: UserId) -> Result<Vec<GuardianLink>, DomainError>;

    /// Returns the link between a traveler and a watcher, if any.
    async fn find_link(
        &self,
        traveler: UserId,
        watcher: UserId,
    ) -> Result<Option<GuardianLink>, DomainError>;

    /// Inserts or replaces a link. Uniqueness is (traveler, watcher).
    async fn upsert_link(&self, link: &GuardianLink) -> Result<(), DomainError>;
}
