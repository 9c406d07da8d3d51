//! Retry and seeding decisions for one incident's cascade.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PhoneNumber, Timestamp};
use crate::domain::guardian::{sort_cascade_order, GuardianLink};

/// System-wide cascade defaults and caps, sourced from configuration.
/// Per-guardian settings on the link override the per-guardian defaults;
/// `max_total_ring_secs` is a hard cap that no link can exceed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CascadeDefaults {
    pub ring_timeout_secs: u32,
    pub max_retries: u32,
    pub retry_backoff_secs: u32,
    pub reminder_interval_secs: u32,
    pub max_total_ring_secs: u32,
}

impl Default for CascadeDefaults {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 25,
            max_retries: 2,
            retry_backoff_secs: 60,
            reminder_interval_secs: 120,
            max_total_ring_secs: 180,
        }
    }
}

/// Outbound number whitelist, enforced in staging environments.
#[derive(Debug, Clone, Default)]
pub struct WhitelistPolicy {
    pub enforce: bool,
    pub allowed: HashSet<String>,
}

impl WhitelistPolicy {
    pub fn allows(&self, phone: &PhoneNumber) -> bool {
        !self.enforce || self.allowed.contains(phone.as_str())
    }
}

/// What to do after a call attempt settles without acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule the next attempt. `run_at` is measured from the previous
    /// attempt's end, so a delayed runner cannot stretch the cascade.
    Retry { attempt_no: u32, run_at: Timestamp },
    /// The guardian's retry or ring budget is spent.
    Exhausted,
}

/// Decides whether a guardian gets another call attempt.
///
/// `attempts_made` counts settled attempts including the one that just
/// ended; `total_ring_secs` is the cumulative ring time across them.
pub fn next_call_attempt(
    link: &GuardianLink,
    attempts_made: u32,
    total_ring_secs: u32,
    last_ended_at: Timestamp,
    defaults: &CascadeDefaults,
) -> RetryDecision {
    if attempts_made >= link.max_retries {
        return RetryDecision::Exhausted;
    }

    if total_ring_secs >= defaults.max_total_ring_secs {
        return RetryDecision::Exhausted;
    }

    RetryDecision::Retry {
        attempt_no: attempts_made + 1,
        run_at: last_ended_at.plus_secs(link.retry_backoff_secs),
    }
}

/// Filters and orders the guardians to contact for one incident.
pub fn seed_targets(mut links: Vec<GuardianLink>) -> Vec<GuardianLink> {
    links.retain(|l| l.is_active() && (l.chat_enabled || l.call_enabled));
    sort_cascade_order(&mut links);
    links
}

/// First call placement time for the guardian at `index` in contact order.
/// Staggered slightly to spread provider load.
pub fn stagger_first_call(now: Timestamp, index: usize) -> Timestamp {
    now.plus_millis(index as u64 * 750)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::guardian::GuardianStatus;

    fn link_with(max_retries: u32, backoff: u32) -> GuardianLink {
        GuardianLink::new(
            UserId::new(),
            UserId::new(),
            1,
            25,
            max_retries,
            backoff,
            Timestamp::from_unix_secs(0),
        )
        .unwrap()
    }

    #[test]
    fn retry_scheduled_from_attempt_end_plus_backoff() {
        let link = link_with(2, 60);
        let ended = Timestamp::from_unix_secs(25);

        let decision = next_call_attempt(&link, 1, 25, ended, &CascadeDefaults::default());

        assert_eq!(
            decision,
            RetryDecision::Retry {
                attempt_no: 2,
                run_at: Timestamp::from_unix_secs(85),
            }
        );
    }

    #[test]
    fn retries_stop_at_max() {
        let link = link_with(2, 60);

        let decision = next_call_attempt(
            &link,
            2,
            50,
            Timestamp::from_unix_secs(110),
            &CascadeDefaults::default(),
        );

        assert_eq!(decision, RetryDecision::Exhausted);
    }

    #[test]
    fn ring_budget_caps_runaway_retries() {
        // Plenty of retries left, but 180 seconds of ring time consumed.
        let link = link_with(10, 60);

        let decision = next_call_attempt(
            &link,
            3,
            180,
            Timestamp::from_unix_secs(400),
            &CascadeDefaults::default(),
        );

        assert_eq!(decision, RetryDecision::Exhausted);
    }

    #[test]
    fn seed_targets_drops_revoked_and_channelless_links() {
        let mut revoked = link_with(2, 60);
        revoked.status = GuardianStatus::Revoked;

        let mut no_channels = link_with(2, 60);
        no_channels.chat_enabled = false;
        no_channels.call_enabled = false;

        let active = link_with(2, 60);

        let targets = seed_targets(vec![revoked, no_channels, active.clone()]);

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].watcher_id, active.watcher_id);
    }

    #[test]
    fn seed_targets_orders_by_priority() {
        let mut first = link_with(2, 60);
        first.priority = 1;
        let mut second = link_with(2, 60);
        second.priority = 2;

        let targets = seed_targets(vec![second.clone(), first.clone()]);

        assert_eq!(targets[0].watcher_id, first.watcher_id);
        assert_eq!(targets[1].watcher_id, second.watcher_id);
    }

    #[test]
    fn stagger_spaces_calls_without_reordering() {
        let now = Timestamp::from_unix_secs(100);
        assert_eq!(stagger_first_call(now, 0), now);
        assert!(stagger_first_call(now, 1).is_after(&now));
        assert!(stagger_first_call(now, 2).is_after(&stagger_first_call(now, 1)));
    }
}
