//! Error types for price feed operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while querying a price source.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("API error: HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Client setup failed: {0}")]
    ClientSetup(String),
}

/// Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::ConnectionFailed(_) | FeedError::Timeout(_) | FeedError::RateLimitExceeded => {
                true
            }
            FeedError::ApiError { status, .. } => *status >= 500,
            FeedError::ParseError(_) | FeedError::ClientSetup(_) => false,
        }
    }

    /// Returns a suggested retry delay for this error type, if applicable.
    /// Returns None for errors that will not go away by themselves.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            FeedError::RateLimitExceeded => Some(Duration::from_secs(60)),
            FeedError::ConnectionFailed(_) => Some(Duration::from_secs(5)),
            FeedError::Timeout(_) => Some(Duration::from_secs(2)),
            FeedError::ApiError { status, .. } if *status >= 500 => Some(Duration::from_secs(5)),
            FeedError::ApiError { .. } | FeedError::ParseError(_) | FeedError::ClientSetup(_) => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FeedError::RateLimitExceeded.is_transient());
        assert!(FeedError::Timeout("10s".into()).is_transient());
        assert!(FeedError::ApiError { status: 503, body: String::new() }.is_transient());
        assert!(!FeedError::ApiError { status: 400, body: String::new() }.is_transient());
        assert!(!FeedError::ParseError("bad json".into()).is_transient());
    }

    #[test]
    fn test_retry_delays() {
        assert_eq!(
            FeedError::RateLimitExceeded.suggested_retry_delay(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(FeedError::ParseError("x".into()).suggested_retry_delay(), None);
    }
}
