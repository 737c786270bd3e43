//! Persistence contract consumed by the orchestrator.
//!
//! The relational store is an external collaborator; this trait is the only
//! surface the sync core touches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::sefaz::{DocumentType, Environment, Nsu};

/// Store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A `running` attempt already exists for the company
    #[error("A sync is already running for company {company_id}")]
    AttemptAlreadyRunning {
        /// Company id
        company_id: String,
    },

    /// No attempt with this id
    #[error("Sync attempt {0} not found")]
    AttemptNotFound(Uuid),

    /// The attempt already left `running`
    #[error("Sync attempt {0} is already finished")]
    AttemptAlreadyFinished(Uuid),

    /// No certificate bundle for the company
    #[error("Company {0} has no certificate bundle")]
    CertificateNotFound(String),

    /// Backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A company as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    /// Company id
    pub id: String,
    /// Display name
    pub name: String,
    /// Own CNPJ (any punctuation)
    pub tax_id: String,
    /// Whether the scheduler should sync it
    pub auto_sync: bool,
    /// Minimum minutes between completed syncs
    pub sync_interval_minutes: u32,
    /// Sealed aggregator token, if the fallback is configured
    #[serde(default)]
    pub nsdocs_token: Option<String>,
}

/// A company's PKCS#12 bundle and its distribution cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// Owning company
    pub company_id: String,
    /// DER-encoded PFX
    pub pfx: Vec<u8>,
    /// Sealed passphrase (`salt:iv:tag:ciphertext`)
    pub encrypted_passphrase: String,
    /// Environment the bundle is registered for
    pub environment: Environment,
    /// Flattened subject distinguished name
    pub subject: String,
    /// Last NSU fully processed
    pub last_nsu: Nsu,
    /// When the cursor was last saved
    pub last_sync_at: Option<DateTime<Utc>>,
    /// End of the certificate validity window, when known
    pub valid_to: Option<DateTime<Utc>>,
}

impl CertificateBundle {
    /// Usable for SEFAZ-direct at `now`: has content and is not expired.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.pfx.is_empty()
            && !self.encrypted_passphrase.is_empty()
            && self.valid_to.is_none_or(|valid_to| valid_to > now)
    }
}

/// How a sync was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    /// SEFAZ-direct
    Sefaz,
    /// Aggregator fallback
    Nsdocs,
}

impl SyncMethod {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sefaz => "sefaz",
            Self::Nsdocs => "nsdocs",
        }
    }
}

/// Attempt lifecycle: `running` → `completed` | `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// In progress
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Error,
}

/// One sync invocation for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAttempt {
    /// Attempt id
    pub id: Uuid,
    /// Company id
    pub company_id: String,
    /// Method used
    pub sync_method: SyncMethod,
    /// Lifecycle state
    pub status: AttemptStatus,
    /// Records inserted
    pub new_docs: u32,
    /// Records already known or updated
    pub updated_docs: u32,
    /// Human-readable failure
    pub error_message: Option<String>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub completed_at: Option<DateTime<Utc>>,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Finished successfully
    Completed {
        /// Records inserted
        new_docs: u32,
        /// Records already known or updated
        updated_docs: u32,
    },
    /// Finished with an error; counters keep partial progress
    Failed {
        /// Human-readable failure
        message: String,
        /// Records inserted before the failure
        new_docs: u32,
        /// Records already known or updated before the failure
        updated_docs: u32,
    },
}

/// Whether a record was issued by the company or received by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The company is the emitter
    Issued,
    /// A third party is the emitter
    Received,
}

/// Status of a fiscal document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Valid
    Authorized,
    /// Cancelled by its emitter
    Cancelled,
}

/// A stored fiscal document, keyed by access key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    /// 44-digit access key
    pub access_key: String,
    /// Owning company
    pub company_id: String,
    /// NFE / CTE
    pub document_type: DocumentType,
    /// Issued or received
    pub direction: Direction,
    /// Authorized or cancelled
    pub status: InvoiceStatus,
    /// Emission date
    pub issued_at: Option<DateTime<Utc>>,
    /// Emitter tax ID
    pub emitter_tax_id: Option<String>,
    /// Emitter name
    pub emitter_name: Option<String>,
    /// Recipient tax ID
    pub recipient_tax_id: Option<String>,
    /// Recipient name
    pub recipient_name: Option<String>,
    /// Total value in cents
    pub total_cents: Option<i64>,
    /// NSU the record was distributed under
    pub nsu: Nsu,
    /// Raw XML
    pub xml: String,
}

/// Result of [`SyncStore::insert_invoice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was stored
    Inserted,
    /// A record with the same access key exists; nothing was written
    AlreadyExists,
}

/// Durable state the sync core reads and writes.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Companies with automatic sync enabled.
    async fn auto_sync_companies(&self) -> Result<Vec<Company>, StoreError>;

    /// The company's certificate bundle, if any.
    async fn certificate_bundle(
        &self,
        company_id: &str,
    ) -> Result<Option<CertificateBundle>, StoreError>;

    /// Persist the cursor and `lastSyncAt`. The stored cursor never moves
    /// backwards; the effective value is returned.
    async fn save_cursor(
        &self,
        company_id: &str,
        last_nsu: Nsu,
        synced_at: DateTime<Utc>,
    ) -> Result<Nsu, StoreError>;

    /// The company's `running` attempt, if any.
    async fn running_attempt(&self, company_id: &str) -> Result<Option<SyncAttempt>, StoreError>;

    /// The company's most recently completed attempt.
    async fn last_completed_attempt(
        &self,
        company_id: &str,
    ) -> Result<Option<SyncAttempt>, StoreError>;

    /// Create a `running` attempt.
    ///
    /// Fails with [`StoreError::AttemptAlreadyRunning`] if one exists.
    async fn create_attempt(
        &self,
        company_id: &str,
        method: SyncMethod,
        started_at: DateTime<Utc>,
    ) -> Result<SyncAttempt, StoreError>;

    /// Move a `running` attempt to `completed` or `error`.
    async fn finish_attempt(
        &self,
        attempt_id: Uuid,
        outcome: AttemptOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<SyncAttempt, StoreError>;

    /// Every `running` attempt, across companies.
    async fn running_attempts(&self) -> Result<Vec<SyncAttempt>, StoreError>;

    /// Look a record up by access key.
    async fn find_invoice(&self, access_key: &str) -> Result<Option<InvoiceRecord>, StoreError>;

    /// Insert unless the access key is already stored.
    async fn insert_invoice(&self, record: InvoiceRecord) -> Result<InsertOutcome, StoreError>;

    /// Change the status of a stored record. Returns whether it changed.
    async fn update_invoice_status(
        &self,
        access_key: &str,
        status: InvoiceStatus,
    ) -> Result<bool, StoreError>;
}
