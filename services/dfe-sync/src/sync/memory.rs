//! In-memory [`SyncStore`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{
    AttemptOutcome, AttemptStatus, CertificateBundle, Company, InsertOutcome, InvoiceRecord,
    InvoiceStatus, StoreError, SyncAttempt, SyncMethod, SyncStore,
};
use crate::sefaz::Nsu;

#[derive(Debug, Default)]
struct State {
    companies: Vec<Company>,
    bundles: HashMap<String, CertificateBundle>,
    attempts: Vec<SyncAttempt>,
    invoices: HashMap<String, InvoiceRecord>,
}

/// Process-local store backed by a single lock.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a company, replacing one with the same id.
    pub async fn upsert_company(&self, company: Company) {
        let mut state = self.state.write().await;
        state.companies.retain(|existing| existing.id != company.id);
        state.companies.push(company);
    }

    /// Attach a certificate bundle to its company.
    pub async fn put_bundle(&self, bundle: CertificateBundle) {
        let mut state = self.state.write().await;
        state.bundles.insert(bundle.company_id.clone(), bundle);
    }

    /// Insert an attempt as-is. Bypasses the running-attempt check.
    pub async fn put_attempt(&self, attempt: SyncAttempt) {
        self.state.write().await.attempts.push(attempt);
    }

    /// Every attempt recorded for `company_id`, oldest first.
    pub async fn attempts_for(&self, company_id: &str) -> Vec<SyncAttempt> {
        self.state
            .read()
            .await
            .attempts
            .iter()
            .filter(|attempt| attempt.company_id == company_id)
            .cloned()
            .collect()
    }

    /// Every stored record of `company_id`.
    pub async fn invoices_for(&self, company_id: &str) -> Vec<InvoiceRecord> {
        let mut records: Vec<_> = self
            .state
            .read()
            .await
            .invoices
            .values()
            .filter(|record| record.company_id == company_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.nsu);
        records
    }
}

#[async_trait]
impl SyncStore for InMemoryStore {
    async fn auto_sync_companies(&self) -> Result<Vec<Company>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .companies
            .iter()
            .filter(|company| company.auto_sync)
            .cloned()
            .collect())
    }

    async fn certificate_bundle(
        &self,
        company_id: &str,
    ) -> Result<Option<CertificateBundle>, StoreError> {
        Ok(self.state.read().await.bundles.get(company_id).cloned())
    }

    async fn save_cursor(
        &self,
        company_id: &str,
        last_nsu: Nsu,
        synced_at: DateTime<Utc>,
    ) -> Result<Nsu, StoreError> {
        let mut state = self.state.write().await;
        let bundle = state
            .bundles
            .get_mut(company_id)
            .ok_or_else(|| StoreError::CertificateNotFound(company_id.to_string()))?;

        bundle.last_nsu = bundle.last_nsu.max(last_nsu);
        bundle.last_sync_at = Some(synced_at);
        Ok(bundle.last_nsu)
    }

    async fn running_attempt(&self, company_id: &str) -> Result<Option<SyncAttempt>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .iter()
            .find(|attempt| {
                attempt.company_id == company_id && attempt.status == AttemptStatus::Running
            })
            .cloned())
    }

    async fn last_completed_attempt(
        &self,
        company_id: &str,
    ) -> Result<Option<SyncAttempt>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .iter()
            .filter(|attempt| {
                attempt.company_id == company_id && attempt.status == AttemptStatus::Completed
            })
            .max_by_key(|attempt| attempt.completed_at)
            .cloned())
    }

    async fn create_attempt(
        &self,
        company_id: &str,
        method: SyncMethod,
        started_at: DateTime<Utc>,
    ) -> Result<SyncAttempt, StoreError> {
        let mut state = self.state.write().await;
        let already_running = state
            .attempts
            .iter()
            .any(|attempt| {
                attempt.company_id == company_id && attempt.status == AttemptStatus::Running
            });
        if already_running {
            return Err(StoreError::AttemptAlreadyRunning {
                company_id: company_id.to_string(),
            });
        }

        let attempt = SyncAttempt {
            id: Uuid::new_v4(),
            company_id: company_id.to_string(),
            sync_method: method,
            status: AttemptStatus::Running,
            new_docs: 0,
            updated_docs: 0,
            error_message: None,
            started_at,
            completed_at: None,
        };
        state.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn finish_attempt(
        &self,
        attempt_id: Uuid,
        outcome: AttemptOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<SyncAttempt, StoreError> {
        let mut state = self.state.write().await;
        let attempt = state
            .attempts
            .iter_mut()
            .find(|attempt| attempt.id == attempt_id)
            .ok_or(StoreError::AttemptNotFound(attempt_id))?;

        if attempt.status != AttemptStatus::Running {
            return Err(StoreError::AttemptAlreadyFinished(attempt_id));
        }

        match outcome {
            AttemptOutcome::Completed { new_docs, updated_docs } => {
                attempt.status = AttemptStatus::Completed;
                attempt.new_docs = new_docs;
                attempt.updated_docs = updated_docs;
            }
            AttemptOutcome::Failed {
                message,
                new_docs,
                updated_docs,
            } => {
                attempt.status = AttemptStatus::Error;
                attempt.error_message = Some(message);
                attempt.new_docs = new_docs;
                attempt.updated_docs = updated_docs;
            }
        }
        attempt.completed_at = Some(completed_at);
        Ok(attempt.clone())
    }

    async fn running_attempts(&self) -> Result<Vec<SyncAttempt>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .iter()
            .filter(|attempt| attempt.status == AttemptStatus::Running)
            .cloned()
            .collect())
    }

    async fn find_invoice(&self, access_key: &str) -> Result<Option<InvoiceRecord>, StoreError> {
        Ok(self.state.read().await.invoices.get(access_key).cloned())
    }

    async fn insert_invoice(&self, record: InvoiceRecord) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.write().await;
        if state.invoices.contains_key(&record.access_key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        state.invoices.insert(record.access_key.clone(), record);
        Ok(InsertOutcome::Inserted)
    }

    async fn update_invoice_status(
        &self,
        access_key: &str,
        status: InvoiceStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.invoices.get_mut(access_key) {
            Some(record) if record.status != status => {
                record.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
