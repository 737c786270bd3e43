//! JSON roster seeding the in-memory store.
//!
//! ```json
//! {
//!   "companies": [{
//!     "id": "acme", "name": "ACME", "taxId": "11.222.333/0001-81",
//!     "autoSync": true, "syncIntervalMinutes": 15,
//!     "certificate": {
//!       "pfxBase64": "...", "encryptedPassphrase": "salt:iv:tag:ct",
//!       "environment": "production", "lastNsu": "000000000000000"
//!     }
//!   }]
//! }
//! ```
//!
//! [`RosterStore`] writes each advanced cursor back to the file, so a restart
//! resumes where the previous process stopped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::memory::InMemoryStore;
use super::store::{
    AttemptOutcome, CertificateBundle, Company, InsertOutcome, InvoiceRecord, InvoiceStatus,
    StoreError, SyncAttempt, SyncMethod, SyncStore,
};
use crate::sefaz::{Environment, Nsu};

/// Roster loading failure.
#[derive(Error, Debug)]
pub enum RosterError {
    /// The file could not be read
    #[error("Cannot read roster {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid roster
    #[error("Invalid roster: {0}")]
    Parse(#[from] serde_json::Error),

    /// A certificate is not valid base64
    #[error("Company {company_id}: certificate is not valid base64")]
    InvalidCertificate {
        /// Company id
        company_id: String,
    },
}

#[derive(Debug, Deserialize)]
struct Roster {
    companies: Vec<RosterCompany>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterCompany {
    #[serde(flatten)]
    company: Company,
    #[serde(default)]
    certificate: Option<RosterCertificate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterCertificate {
    pfx_base64: String,
    encrypted_passphrase: String,
    environment: Environment,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    last_nsu: Nsu,
    #[serde(default)]
    last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    valid_to: Option<DateTime<Utc>>,
}

/// Parse a roster document and load it into `store`.
///
/// Returns the number of companies loaded.
///
/// # Errors
///
/// Returns [`RosterError`] on invalid JSON or undecodable certificates.
pub async fn load_roster_str(store: &InMemoryStore, json: &str) -> Result<usize, RosterError> {
    let roster: Roster = serde_json::from_str(json)?;
    let count = roster.companies.len();

    for entry in roster.companies {
        let company_id = entry.company.id.clone();
        if let Some(cert) = entry.certificate {
            let pfx = STANDARD
                .decode(cert.pfx_base64.trim())
                .map_err(|_| RosterError::InvalidCertificate {
                    company_id: company_id.clone(),
                })?;
            store
                .put_bundle(CertificateBundle {
                    company_id: company_id.clone(),
                    pfx,
                    encrypted_passphrase: cert.encrypted_passphrase,
                    environment: cert.environment,
                    subject: cert.subject,
                    last_nsu: cert.last_nsu,
                    last_sync_at: cert.last_sync_at,
                    valid_to: cert.valid_to,
                })
                .await;
        } else if entry.company.nsdocs_token.is_none() {
            warn!(
                company_id = %company_id,
                "Roster company has neither certificate nor aggregator token"
            );
        }
        store.upsert_company(entry.company).await;
    }

    Ok(count)
}

/// Read the roster at `path` and load it into `store`.
///
/// # Errors
///
/// Returns [`RosterError`] if the file cannot be read or parsed.
pub async fn load_roster_file(store: &InMemoryStore, path: &Path) -> Result<usize, RosterError> {
    let json = tokio::fs::read_to_string(path).await.map_err(|source| RosterError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let count = load_roster_str(store, &json).await?;
    info!(path = %path.display(), companies = count, "Roster loaded");
    Ok(count)
}

/// [`InMemoryStore`] loaded from a roster file that receives every saved cursor.
///
/// Attempts and invoices stay in memory.
#[derive(Debug)]
pub struct RosterStore {
    inner: InMemoryStore,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RosterStore {
    /// Load the roster at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError`] if the file cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RosterError> {
        let path = path.into();
        let inner = InMemoryStore::new();
        load_roster_file(&inner, &path).await?;
        Ok(Self {
            inner,
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// The in-memory view the roster was loaded into.
    #[must_use]
    pub fn memory(&self) -> &InMemoryStore {
        &self.inner
    }

    async fn persist_cursor(
        &self,
        company_id: &str,
        last_nsu: Nsu,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| backend(&self.path, &e))?;
        let mut roster: Value = serde_json::from_str(&json).map_err(|e| backend(&self.path, &e))?;

        let certificate = roster
            .get_mut("companies")
            .and_then(Value::as_array_mut)
            .and_then(|companies| {
                companies
                    .iter_mut()
                    .find(|company| company.get("id").and_then(Value::as_str) == Some(company_id))
            })
            .and_then(|company| company.get_mut("certificate"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| StoreError::CertificateNotFound(company_id.to_string()))?;
        certificate.insert("lastNsu".to_string(), Value::String(last_nsu.to_wire()));
        certificate.insert(
            "lastSyncAt".to_string(),
            Value::String(synced_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        let rendered = serde_json::to_string_pretty(&roster).map_err(|e| backend(&self.path, &e))?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, rendered).await.map_err(|e| backend(&staging, &e))?;
        tokio::fs::rename(&staging, &self.path).await.map_err(|e| backend(&self.path, &e))?;

        debug!(company_id = %company_id, last_nsu = %last_nsu, "Cursor written to roster");
        Ok(())
    }
}

fn backend(path: &Path, error: &dyn std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("roster {}: {error}", path.display()))
}

#[async_trait]
impl SyncStore for RosterStore {
    async fn auto_sync_companies(&self) -> Result<Vec<Company>, StoreError> {
        self.inner.auto_sync_companies().await
    }

    async fn certificate_bundle(
        &self,
        company_id: &str,
    ) -> Result<Option<CertificateBundle>, StoreError> {
        self.inner.certificate_bundle(company_id).await
    }

    async fn save_cursor(
        &self,
        company_id: &str,
        last_nsu: Nsu,
        synced_at: DateTime<Utc>,
    ) -> Result<Nsu, StoreError> {
        let effective = self.inner.save_cursor(company_id, last_nsu, synced_at).await?;
        self.persist_cursor(company_id, effective, synced_at).await?;
        Ok(effective)
    }

    async fn running_attempt(&self, company_id: &str) -> Result<Option<SyncAttempt>, StoreError> {
        self.inner.running_attempt(company_id).await
    }

    async fn last_completed_attempt(
        &self,
        company_id: &str,
    ) -> Result<Option<SyncAttempt>, StoreError> {
        self.inner.last_completed_attempt(company_id).await
    }

    async fn create_attempt(
        &self,
        company_id: &str,
        method: SyncMethod,
        started_at: DateTime<Utc>,
    ) -> Result<SyncAttempt, StoreError> {
        self.inner.create_attempt(company_id, method, started_at).await
    }

    async fn finish_attempt(
        &self,
        attempt_id: Uuid,
        outcome: AttemptOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<SyncAttempt, StoreError> {
        self.inner.finish_attempt(attempt_id, outcome, completed_at).await
    }

    async fn running_attempts(&self) -> Result<Vec<SyncAttempt>, StoreError> {
        self.inner.running_attempts().await
    }

    async fn find_invoice(&self, access_key: &str) -> Result<Option<InvoiceRecord>, StoreError> {
        self.inner.find_invoice(access_key).await
    }

    async fn insert_invoice(&self, record: InvoiceRecord) -> Result<InsertOutcome, StoreError> {
        self.inner.insert_invoice(record).await
    }

    async fn update_invoice_status(
        &self,
        access_key: &str,
        status: InvoiceStatus,
    ) -> Result<bool, StoreError> {
        self.inner.update_invoice_status(access_key, status).await
    }
}
