//! Guardian link: the relationship that makes one user an emergency
//! contact for another, with per-guardian cascade settings.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::foundation::{Timestamp, UserId, ValidationError};

/// Link lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianStatus {
    Active,
    Revoked,
}

/// One (traveler, watcher) relationship. Unique per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianLink {
    pub traveler_id: UserId,
    pub watcher_id: UserId,

    /// Contact order within the cascade, 1 is first. Ties broken by link
    /// creation time ascending.
    pub priority: u16,

    pub ring_timeout_secs: u32,
    pub max_retries: u32,
    pub retry_backoff_secs: u32,

    pub chat_enabled: bool,
    pub call_enabled: bool,

    pub status: GuardianStatus,
    pub created_at: Timestamp,
}

impl GuardianLink {
    /// Creates an active link with the given cascade settings.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero priority.
    pub fn new(
        traveler_id: UserId,
        watcher_id: UserId,
        priority: u16,
        ring_timeout_secs: u32,
        max_retries: u32,
        retry_backoff_secs: u32,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if priority == 0 {
            return Err(ValidationError::out_of_range(
                "priority",
                1,
                u16::MAX as i64,
                0,
            ));
        }

        Ok(Self {
            traveler_id,
            watcher_id,
            priority,
            ring_timeout_secs,
            max_retries,
            retry_backoff_secs,
            chat_enabled: true,
            call_enabled: true,
            status: GuardianStatus::Active,
            created_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == GuardianStatus::Active
    }

    /// Total order within one traveler's cascade: priority ascending,
    /// link creation time ascending.
    pub fn cascade_cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.created_at.cmp(&other.created_at))
    }
}

/// Sorts links into cascade contact order.
pub fn sort_cascade_order(links: &mut [GuardianLink]) {
    links.sort_by(|a, b| a.cascade_cmp(b));
}
