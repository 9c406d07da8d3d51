//! Cascade timing defaults and caps.

use crate::domain::cascade::CascadeDefaults;

use super::error::ValidationError;

/// Cascade configuration, from the `DEFAULT_*` and
/// `INCIDENT_MAX_TOTAL_RING_SEC` keys.
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub default_ring_timeout_sec: u32,
    pub default_max_retries: u32,
    pub default_retry_backoff_sec: u32,
    pub default_reminder_interval_sec: u32,
    pub incident_max_total_ring_sec: u32,
}

impl CascadeConfig {
    /// The policy-engine view of these settings.
    pub fn defaults(&self) -> CascadeDefaults {
        CascadeDefaults {
            ring_timeout_secs: self.default_ring_timeout_sec,
            max_retries: self.default_max_retries,
            retry_backoff_secs: self.default_retry_backoff_sec,
            reminder_interval_secs: self.default_reminder_interval_sec,
            max_total_ring_secs: self.incident_max_total_ring_sec,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_ring_timeout_sec == 0 {
            return Err(ValidationError::InvalidCascadeSetting {
                key: "DEFAULT_RING_TIMEOUT_SEC",
            });
        }
        if self.default_max_retries == 0 {
            return Err(ValidationError::InvalidCascadeSetting {
                key: "DEFAULT_MAX_RETRIES",
            });
        }
        if self.default_retry_backoff_sec == 0 {
            return Err(ValidationError::InvalidCascadeSetting {
                key: "DEFAULT_RETRY_BACKOFF_SEC",
            });
        }
        if self.default_reminder_interval_sec == 0 {
            return Err(ValidationError::InvalidCascadeSetting {
                key: "DEFAULT_REMINDER_INTERVAL_SEC",
            });
        }
        if self.incident_max_total_ring_sec < self.default_ring_timeout_sec {
            return Err(ValidationError::InvalidCascadeSetting {
                key: "INCIDENT_MAX_TOTAL_RING_SEC",
            });
        }
        Ok(())
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            default_ring_timeout_sec: 25,
            default_max_retries: 2,
            default_retry_backoff_sec: 60,
            default_reminder_interval_sec: 120,
            incident_max_total_ring_sec: 180,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CascadeConfig::default();
        let defaults = config.defaults();

        assert_eq!(defaults.ring_timeout_secs, 25);
        assert_eq!(defaults.max_retries, 2);
        assert_eq!(defaults.retry_backoff_secs, 60);
        assert_eq!(defaults.reminder_interval_secs, 120);
        assert_eq!(defaults.max_total_ring_secs, 180);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ring_cap_below_single_ring_is_rejected() {
        let config = CascadeConfig {
            incident_max_total_ring_sec: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_backoff_is_rejected() {
        let config = CascadeConfig {
            default_retry_backoff_sec: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
