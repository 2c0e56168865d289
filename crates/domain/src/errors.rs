//! Error types used throughout the engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CalWeave
///
/// The first five variants form the provider-error taxonomy every adapter
/// maps into; the rest cover the engine's own failure modes. `Clone` is
/// derived because a single refresh or task outcome fans out to every
/// caller awaiting it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalWeaveError {
    /// Network failure, 5xx, or timeout. A later attempt may succeed.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// 401 or invalid_grant. Never retried; the connection needs a reconnect.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// 429. Retryable with backoff, honoring `Retry-After` when present.
    #[error("Rate limited: {message}")]
    RateLimited { message: String, retry_after_secs: Option<u64> },

    /// Remote resource missing. Already-consistent for deletes, hard
    /// failure for updates.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed payload. Never retried, surfaced to the caller immediately.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalWeaveError {
    /// Build a rate-limit error, carrying the provider's `Retry-After`
    /// hint in seconds when it sent one.
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self::RateLimited { message: message.into(), retry_after_secs }
    }

    /// Whether a retry of the failed operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    /// The provider-supplied wait hint, if this is a rate-limit error
    /// that carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs: Some(secs), .. } => {
                Some(Duration::from_secs(*secs))
            }
            _ => None,
        }
    }
}

/// Result type alias for CalWeave operations
pub type Result<T> = std::result::Result<T, CalWeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification_covers_the_taxonomy() {
        assert!(CalWeaveError::Transient("timeout".into()).is_retryable());
        assert!(CalWeaveError::rate_limited("slow down", Some(3)).is_retryable());
        assert!(!CalWeaveError::AuthExpired("invalid_grant".into()).is_retryable());
        assert!(!CalWeaveError::NotFound("gone".into()).is_retryable());
        assert!(!CalWeaveError::Validation("bad payload".into()).is_retryable());
    }

    #[test]
    fn retry_after_surfaces_only_when_the_provider_sent_a_hint() {
        assert_eq!(
            CalWeaveError::rate_limited("429", Some(30)).retry_after(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(CalWeaveError::rate_limited("429", None).retry_after(), None);
        assert_eq!(CalWeaveError::Transient("503".into()).retry_after(), None);
    }

    #[test]
    fn errors_serialize_with_tagged_representation() {
        let json = serde_json::to_value(CalWeaveError::AuthExpired("revoked".into()))
            .unwrap_or_default();
        assert_eq!(json["type"], "AuthExpired");
        assert_eq!(json["message"], "revoked");
    }
}
