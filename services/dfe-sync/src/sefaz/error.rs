//! SEFAZ protocol client error types.

use rust_common::PlatformError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a distribution request.
#[derive(Error, Debug)]
pub enum SefazError {
    /// `cStat` 656: the query-rate policy was exceeded
    #[error("SEFAZ rate limit exceeded (cStat 656): {message}")]
    RateLimited {
        /// Server message (`xMotivo`)
        message: String,
        /// How long to wait before querying again
        retry_after: Duration,
    },

    /// Any `cStat` other than 137, 138 or 656
    #[error("SEFAZ rejected the request (cStat {code}): {message}")]
    Protocol {
        /// Server status code
        code: u16,
        /// Server message (`xMotivo`)
        message: String,
    },

    /// TLS, connection or deadline failure
    #[error("SEFAZ transport failure: {0}")]
    Transport(#[source] PlatformError),

    /// The endpoint answered with a non-success HTTP status and no usable envelope
    #[error("SEFAZ answered HTTP {status}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
    },

    /// The endpoint answered with a SOAP fault instead of a distribution result
    #[error("SEFAZ returned a SOAP fault: {0}")]
    Fault(String),

    /// The envelope lacks the fields the protocol requires
    #[error("Invalid SEFAZ response: {0}")]
    InvalidResponse(String),

    /// The mutual-TLS client could not be built
    #[error("Cannot configure SEFAZ client: {0}")]
    Setup(#[source] PlatformError),
}

impl SefazError {
    /// Whether a later run may succeed without operator action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Transport(e) => e.is_retryable(),
            Self::HttpStatus { status } => *status >= 500,
            Self::Protocol { .. }
            | Self::Fault(_)
            | Self::InvalidResponse(_)
            | Self::Setup(_) => false,
        }
    }

    /// Cooldown requested by the server, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the request deadline expired.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(PlatformError::Timeout(_)))
    }
}

impl From<reqwest::Error> for SefazError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(PlatformError::from_transport(err))
    }
}
