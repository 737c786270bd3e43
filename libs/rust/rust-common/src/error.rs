//! Centralized error types for all Rust libraries.
//!
//! This module provides a unified error type that can be used across all
//! fiscal-platform Rust services, with built-in retryability classification.

use thiserror::Error;

/// Common error type for platform operations.
///
/// All errors are classified as either retryable or non-retryable,
/// which helps callers decide whether to retry failed operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The client certificate/key pair could not be loaded
    #[error("Invalid client identity: {0}")]
    InvalidIdentity(String),

    /// An additional trust root could not be loaded
    #[error("Invalid root certificate: {0}")]
    InvalidRootCertificate(String),

    /// Service is temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PlatformError {
    /// Check if this error is retryable.
    ///
    /// Retryable errors are transient failures that may succeed on retry,
    /// such as network issues or temporary unavailability.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// let err = PlatformError::Timeout("sefaz".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = PlatformError::InvalidIdentity("bad key".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Classify a transport-level reqwest failure.
    ///
    /// Deadline expiry becomes [`PlatformError::Timeout`], connection
    /// failures become [`PlatformError::Unavailable`]; everything else is
    /// kept as the raw HTTP error.
    #[must_use]
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(PlatformError::Unavailable("test".to_string()).is_retryable());
        assert!(PlatformError::Timeout("test".to_string()).is_retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!PlatformError::InvalidIdentity("test".to_string()).is_retryable());
        assert!(!PlatformError::InvalidRootCertificate("test".to_string()).is_retryable());
        assert!(!PlatformError::invalid_input("test").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = PlatformError::Timeout("after 30s".to_string());
        assert_eq!(err.to_string(), "Operation timed out: after 30s");

        let err = PlatformError::unavailable("sefaz");
        assert_eq!(err.to_string(), "Service unavailable: sefaz");
    }
}
