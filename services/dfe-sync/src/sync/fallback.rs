//! Third-party aggregator used when a company has no usable certificate.

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use super::store::Company;

/// Aggregator failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FallbackError {
    /// The aggregator refused the token
    #[error("Aggregator rejected the credentials")]
    Unauthorized,

    /// The aggregator could not be reached or answered with an error
    #[error("Aggregator request failed: {0}")]
    Unavailable(String),
}

/// Counters reported by a full aggregator sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackSummary {
    /// Records inserted
    pub new_docs: u32,
    /// Records already known or updated
    pub updated_docs: u32,
}

/// A source able to pull every document of a company in one call.
#[async_trait]
pub trait FallbackSource: Send + Sync {
    /// Run a complete sync for `company` authenticated with `token`.
    async fn full_sync(
        &self,
        company: &Company,
        token: &SecretString,
    ) -> Result<FallbackSummary, FallbackError>;
}
