//! Feature flags and the outbound number whitelist.

use crate::domain::cascade::WhitelistPolicy;
use crate::domain::foundation::PhoneNumber;

use super::error::ValidationError;

/// Feature flags, from `FEATURE_PANIC`, `SCHEDULER_ENABLED`,
/// `FEATURE_ALLOW_ONLY_WHITELIST`, and `ALLOWED_E164_NUMBERS`.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    /// Master switch for the whole panic flow.
    pub panic_enabled: bool,

    /// Whether this process runs the scheduler loop.
    pub scheduler_enabled: bool,

    /// When true, calls only go to whitelisted numbers.
    pub allow_only_whitelist: bool,

    /// CSV whitelist of E.164 numbers.
    pub allowed_e164_numbers: Vec<String>,
}

impl FeatureFlags {
    /// Builds the call-placement whitelist policy.
    pub fn whitelist_policy(&self) -> WhitelistPolicy {
        WhitelistPolicy {
            enforce: self.allow_only_whitelist,
            allowed: self.allowed_e164_numbers.iter().cloned().collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.allow_only_whitelist && self.allowed_e164_numbers.is_empty() {
            return Err(ValidationError::EmptyWhitelist);
        }
        for entry in &self.allowed_e164_numbers {
            if PhoneNumber::parse(entry).is_err() {
                return Err(ValidationError::InvalidWhitelistEntry {
                    entry: entry.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            panic_enabled: true,
            scheduler_enabled: true,
            allow_only_whitelist: false,
            allowed_e164_numbers: Vec::new(),
        }
    }
}

/// Splits the `ALLOWED_E164_NUMBERS` CSV value.
pub fn parse_csv_numbers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_parsing_trims_and_drops_empties() {
        let numbers = parse_csv_numbers(" +34600111222 , +79161234567 ,, ");
        assert_eq!(numbers, vec!["+34600111222", "+79161234567"]);
    }

    #[test]
    fn whitelist_enforcement_requires_entries() {
        let flags = FeatureFlags {
            allow_only_whitelist: true,
            ..Default::default()
        };
        assert_eq!(flags.validate(), Err(ValidationError::EmptyWhitelist));
    }

    #[test]
    fn invalid_whitelist_entry_is_rejected() {
        let flags = FeatureFlags {
            allowed_e164_numbers: vec!["not-a-number".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            flags.validate(),
            Err(ValidationError::InvalidWhitelistEntry { .. })
        ));
    }

    #[test]
    fn policy_allows_everything_when_not_enforced() {
        let flags = FeatureFlags::default();
        let policy = flags.whitelist_policy();
        assert!(policy.allows(&PhoneNumber::parse("+34600111222").unwrap()));
    }

    #[test]
    fn policy_restricts_when_enforced() {
        let flags = FeatureFlags {
            allow_only_whitelist: true,
            allowed_e164_numbers: vec!["+34600111222".to_string()],
            ..Default::default()
        };
        let policy = flags.whitelist_policy();
        assert!(policy.allows(&PhoneNumber::parse("+34600111222").unwrap()));
        assert!(!policy.allows(&PhoneNumber::parse("+79161234567").unwrap()));
    }
}
