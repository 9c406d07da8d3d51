//! Voice webhook signature verification.
//!
//! The provider signs each delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw body}"` and sends the hex signature and the Unix
//! timestamp in separate headers. Verification checks the timestamp
//! window first (replay protection) and compares signatures in constant
//! time.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Webhook authentication failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookAuthError {
    #[error("signature does not match")]
    InvalidSignature,

    #[error("event timestamp too old")]
    TimestampOutOfRange,

    #[error("event timestamp in the future")]
    InvalidTimestamp,

    #[error("malformed signature material: {0}")]
    ParseError(String),
}

/// Verifier for voice provider webhook signatures.
pub struct VoiceWebhookVerifier {
    secret: SecretString,
}

impl VoiceWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies one delivery.
    ///
    /// # Errors
    ///
    /// - `ParseError` - non-numeric timestamp or non-hex signature
    /// - `TimestampOutOfRange` / `InvalidTimestamp` - replay window violated
    /// - `InvalidSignature` - HMAC mismatch
    pub fn verify(
        &self,
        timestamp_header: &str,
        signature_header: &str,
        body: &[u8],
    ) -> Result<(), WebhookAuthError> {
        let timestamp: i64 = timestamp_header
            .trim()
            .parse()
            .map_err(|_| WebhookAuthError::ParseError("invalid timestamp".to_string()))?;

        self.validate_timestamp(timestamp)?;

        let provided = hex::decode(signature_header.trim())
            .map_err(|_| WebhookAuthError::ParseError("invalid signature hex".to_string()))?;

        let expected = self.compute_signature(timestamp, body);
        if !constant_time_compare(&expected, &provided) {
            return Err(WebhookAuthError::InvalidSignature);
        }

        Ok(())
    }

    fn validate_timestamp(&self, timestamp: i64) -> Result<(), WebhookAuthError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > MAX_EVENT_AGE_SECS {
            return Err(WebhookAuthError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookAuthError::InvalidTimestamp);
        }
        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, body: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time comparison; prevents timing attacks on the signature.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes the hex signature for test fixtures.
#[cfg(test)]
pub fn compute_test_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "voice_test_secret_123";

    fn verifier() -> VoiceWebhookVerifier {
        VoiceWebhookVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"data":{"id":"evt-1","event_type":"call.answered"}}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = compute_test_signature(TEST_SECRET, timestamp, body);

        let result = verifier().verify(&timestamp.to_string(), &signature, body);

        assert_eq!(result, Ok(()));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = br#"{"data":{}}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = compute_test_signature("other_secret", timestamp, body);

        let result = verifier().verify(&timestamp.to_string(), &signature, body);

        assert_eq!(result, Err(WebhookAuthError::InvalidSignature));
    }

    #[test]
    fn tampered_body_fails() {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = compute_test_signature(TEST_SECRET, timestamp, b"original");

        let result = verifier().verify(&timestamp.to_string(), &signature, b"tampered");

        assert_eq!(result, Err(WebhookAuthError::InvalidSignature));
    }

    #[test]
    fn old_timestamp_fails() {
        let body = b"{}";
        let timestamp = chrono::Utc::now().timestamp() - 600;
        let signature = compute_test_signature(TEST_SECRET, timestamp, body);

        let result = verifier().verify(&timestamp.to_string(), &signature, body);

        assert_eq!(result, Err(WebhookAuthError::TimestampOutOfRange));
    }

    #[test]
    fn future_timestamp_beyond_skew_fails() {
        let body = b"{}";
        let timestamp = chrono::Utc::now().timestamp() + 120;
        let signature = compute_test_signature(TEST_SECRET, timestamp, body);

        let result = verifier().verify(&timestamp.to_string(), &signature, body);

        assert_eq!(result, Err(WebhookAuthError::InvalidTimestamp));
    }

    #[test]
    fn slight_future_skew_is_tolerated() {
        let body = b"{}";
        let timestamp = chrono::Utc::now().timestamp() + 30;
        let signature = compute_test_signature(TEST_SECRET, timestamp, body);

        let result = verifier().verify(&timestamp.to_string(), &signature, body);

        assert_eq!(result, Ok(()));
    }

    #[test]
    fn garbage_headers_are_parse_errors() {
        let result = verifier().verify("not-a-number", "aabb", b"{}");
        assert!(matches!(result, Err(WebhookAuthError::ParseError(_))));

        let timestamp = chrono::Utc::now().timestamp();
        let result = verifier().verify(&timestamp.to_string(), "zzzz", b"{}");
        assert!(matches!(result, Err(WebhookAuthError::ParseError(_))));
    }
}
