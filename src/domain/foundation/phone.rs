//! E.164 phone number value object.
//!
//! Accepts loose user input (spaces, dashes, parentheses, a `00`
//! international prefix) and normalizes to strict E.164 before storage.
//! Anything that does not normalize is rejected at the edge.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::ValidationError;

/// Minimum digits after the `+` sign. Shortest national numbers in use.
const MIN_DIGITS: usize = 8;

/// Maximum digits after the `+` sign, per E.164.
const MAX_DIGITS: usize = 15;

/// Phone number in E.164 format: `+` followed by 8 to 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parses and normalizes a phone number.
    ///
    /// Normalization strips separators (` `, `-`, `.`, `(`, `)`) and
    /// rewrites a leading `00` to `+`. The result must be `+` followed
    /// by 8-15 digits, first digit non-zero.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFormat` for anything that does
    /// not normalize to E.164.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let stripped: String = input
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();

        if stripped.is_empty() {
            return Err(ValidationError::empty_field("phone"));
        }

        let normalized = if let Some(rest) = stripped.strip_prefix("00") {
            format!("+{}", rest)
        } else {
            stripped
        };

        let digits = match normalized.strip_prefix('+') {
            Some(d) => d,
            None => {
                return Err(ValidationError::invalid_format(
                    "phone",
                    "must start with + or 00",
                ))
            }
        };

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::invalid_format(
                "phone",
                "contains non-digit characters",
            ));
        }

        if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
            return Err(ValidationError::out_of_range(
                "phone",
                MIN_DIGITS as i64,
                MAX_DIGITS as i64,
                digits.len() as i64,
            ));
        }

        if digits.starts_with('0') {
            return Err(ValidationError::invalid_format(
                "phone",
                "country code cannot start with 0",
            ));
        }

        Ok(Self(format!("+{}", digits)))
    }

    /// Returns the E.164 string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PhoneNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        PhoneNumber::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_e164() {
        let phone = PhoneNumber::parse("+34600111222").unwrap();
        assert_eq!(phone.as_str(), "+34600111222");
    }

    #[test]
    fn normalizes_separators() {
        let phone = PhoneNumber::parse("+7 (916) 123-45-67").unwrap();
        assert_eq!(phone.as_str(), "+79161234567");
    }

    #[test]
    fn normalizes_double_zero_prefix() {
        let phone = PhoneNumber::parse("0034 600 111 222").unwrap();
        assert_eq!(phone.as_str(), "+34600111222");
    }

    #[test]
    fn rejects_missing_plus() {
        assert!(PhoneNumber::parse("34600111222").is_err());
    }

    #[test]
    fn rejects_letters() {
        assert!(PhoneNumber::parse("+34600ABC222").is_err());
    }

    #[test]
    fn rejects_too_short_and_too_long() {
        assert!(PhoneNumber::parse("+1234567").is_err());
        assert!(PhoneNumber::parse("+1234567890123456").is_err());
    }

    #[test]
    fn rejects_leading_zero_country_code() {
        assert!(PhoneNumber::parse("+0916123456").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(PhoneNumber::parse("   ").is_err());
    }

    #[test]
    fn deserializes_with_normalization() {
        let phone: PhoneNumber = serde_json::from_str("\"+7 916 123 45 67\"").unwrap();
        assert_eq!(phone.as_str(), "+79161234567");
    }

    #[test]
    fn deserialization_rejects_invalid() {
        assert!(serde_json::from_str::<PhoneNumber>("\"hello\"").is_err());
    }
}
