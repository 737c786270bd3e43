//! Error handling module with type-safe, non-exhaustive error types
//!
//! Module errors (cipher, certificate, SEFAZ, store, fallback, config) are
//! unified in [`SyncError`], which classifies them with a stable code and a
//! retryability hint. Messages persisted on sync attempts go through
//! [`SyncError::sanitized_message`] so secrets never reach the store.

use std::time::Duration;

use thiserror::Error;

use crate::certificate::CertificateError;
use crate::config::ConfigError;
use crate::crypto::CipherError;
use crate::sefaz::SefazError;
use crate::sync::{FallbackError, StoreError};

/// Sensitive patterns that should be sanitized from error messages
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "passphrase",
    "secret",
    "token",
    "bearer",
    "authorization",
    "master key",
    "-----begin",
];

/// Non-exhaustive error enum for forward compatibility
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SyncError {
    /// A sealed passphrase or token could not be opened
    #[error("Credential error: {0}")]
    Credential(#[from] CipherError),

    /// The PKCS#12 bundle could not be used
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// SEFAZ request failed
    #[error(transparent)]
    Sefaz(#[from] SefazError),

    /// Persistence failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Aggregator sync failed
    #[error("Fallback error: {0}")]
    Fallback(#[from] FallbackError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Stable error codes recorded in logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Sealed secret unusable
    Credential,
    /// Bundle unusable
    CertificateFormat,
    /// Network or TLS failure
    Transport,
    /// Request deadline expired
    Timeout,
    /// SEFAZ answered with an error status or an unusable envelope
    Protocol,
    /// SEFAZ answered 656
    RateLimited,
    /// Persistence failure
    Store,
    /// Aggregator failure
    Fallback,
    /// Configuration failure
    Config,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "CREDENTIAL_ERROR",
            Self::CertificateFormat => "CERTIFICATE_FORMAT_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Timeout => "TRANSPORT_TIMEOUT",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::Store => "STORE_ERROR",
            Self::Fallback => "FALLBACK_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    /// Get the error code for this error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Credential(_) => ErrorCode::Credential,
            Self::Certificate(_) => ErrorCode::CertificateFormat,
            Self::Sefaz(e) => match e {
                SefazError::RateLimited { .. } => ErrorCode::RateLimited,
                SefazError::Protocol { .. }
                | SefazError::Fault(_)
                | SefazError::InvalidResponse(_) => ErrorCode::Protocol,
                _ if e.is_timeout() => ErrorCode::Timeout,
                SefazError::Transport(_) | SefazError::HttpStatus { .. } | SefazError::Setup(_) => {
                    ErrorCode::Transport
                }
            },
            Self::Store(_) => ErrorCode::Store,
            Self::Fallback(_) => ErrorCode::Fallback,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// Check if a later run may succeed without operator action
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sefaz(e) => e.is_retryable(),
            Self::Store(e) => matches!(e, StoreError::Backend(_)),
            Self::Fallback(e) => matches!(e, FallbackError::Unavailable(_)),
            Self::Credential(_) | Self::Certificate(_) | Self::Config(_) => false,
        }
    }

    /// Get retry-after duration if applicable
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Sefaz(e) => e.retry_after(),
            _ => None,
        }
    }

    /// Message safe to persist on a sync attempt.
    #[must_use]
    pub fn sanitized_message(&self) -> String {
        match self {
            Self::Credential(CipherError::MissingMasterKey) => {
                "Credential master key is not configured".to_string()
            }
            Self::Credential(_) => "Stored credential could not be decrypted".to_string(),
            Self::Certificate(CertificateError::InvalidPassphrase) => {
                "Certificate passphrase is invalid".to_string()
            }
            Self::Sefaz(SefazError::RateLimited { message, retry_after }) => format!(
                "SEFAZ rate limit exceeded (cStat 656): {}. Retry after {} minutes",
                sanitize_message(message, "query limit reached"),
                retry_after.as_secs().div_ceil(60)
            ),
            other => sanitize_message(&other.to_string(), "Internal error"),
        }
    }
}

/// Sanitize a message by removing sensitive information
fn sanitize_message(message: &str, replacement: &str) -> String {
    if contains_sensitive_info(message) {
        replacement.to_string()
    } else {
        message.to_string()
    }
}

/// Check if a string contains sensitive information
#[must_use]
pub fn contains_sensitive_info(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
