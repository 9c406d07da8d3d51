//! Provider error classification shared by the chat and voice ports.

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Whether a failed provider call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network failure, timeout, 5xx, rate limit. Retry with backoff.
    Transient,
    /// Provider rejected the request (bad number, revoked chat). Do not retry.
    Permanent,
}

/// Error returned by a provider port.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

impl From<ProviderError> for DomainError {
    fn from(err: ProviderError) -> Self {
        let code = match err.kind {
            ProviderErrorKind::Transient => ErrorCode::ProviderTransient,
            ProviderErrorKind::Permanent => ErrorCode::ProviderPermanent,
        };
        DomainError::new(code, err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_preserves_retry_class() {
        let transient: DomainError = ProviderError::transient("timeout").into();
        assert_eq!(transient.code, ErrorCode::ProviderTransient);
        assert!(transient.is_retryable());

        let permanent: DomainError = ProviderError::permanent("unknown chat").into();
        assert_eq!(permanent.code, ErrorCode::ProviderPermanent);
        assert!(!permanent.is_retryable());
    }
}
