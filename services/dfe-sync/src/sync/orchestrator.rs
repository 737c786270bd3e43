//! Per-company sync runs.
//!
//! A tick reaps abandoned attempts, then walks every auto-sync company in
//! turn. Each company either syncs directly against SEFAZ with its own
//! certificate, falls back to the aggregator, or is skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::fallback::{FallbackError, FallbackSource, FallbackSummary};
use super::store::{
    AttemptOutcome, CertificateBundle, Company, Direction, InsertOutcome, InvoiceRecord,
    InvoiceStatus, StoreError, SyncMethod, SyncStore,
};
use crate::certificate::{jurisdiction_code, parse_bundle};
use crate::crypto::CredentialCipher;
use crate::error::{ErrorCode, SyncError};
use crate::sefaz::{
    AccessKey, ConnectRequest, DocumentKind, DocumentType, Nsu, RATE_LIMIT_COOLDOWN,
    RawSefazDocument, SefazConnector, SefazError, normalize_tax_id,
};

/// Distribution calls per company per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;
/// Age after which a `running` attempt is considered abandoned.
pub const DEFAULT_STALE_ATTEMPT_AFTER: Duration = Duration::from_secs(30 * 60);
/// Jurisdiction used when the certificate subject names no state (São Paulo).
pub const DEFAULT_JURISDICTION: &str = "35";

/// Orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Distribution calls per company per run
    pub max_iterations: u32,
    /// How long SEFAZ-direct is paused for a company after a 656
    pub rate_limit_cooldown: Duration,
    /// Age after which a `running` attempt is reaped
    pub stale_attempt_after: Duration,
    /// Two-digit jurisdiction code used when the subject names no state
    pub default_jurisdiction: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            stale_attempt_after: DEFAULT_STALE_ATTEMPT_AFTER,
            default_jurisdiction: DEFAULT_JURISDICTION.to_string(),
        }
    }
}

/// Why a company was not synced on a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Another attempt is in progress
    AlreadyRunning,
    /// The last completed sync is younger than the company interval
    SyncedRecently {
        /// Earliest time the next sync is due
        next_due: DateTime<Utc>,
    },
    /// SEFAZ-direct is cooling down after a 656 and no fallback applies
    RateLimited {
        /// End of the cooldown
        until: DateTime<Utc>,
    },
    /// Neither a usable certificate nor an aggregator token
    NoSyncSource,
}

/// Counters of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Attempt id
    pub attempt_id: Uuid,
    /// Method used
    pub method: SyncMethod,
    /// Records inserted
    pub new_docs: u32,
    /// Records already known or updated
    pub updated_docs: u32,
    /// Documents dropped because their payload could not be decoded
    pub skipped_docs: u32,
    /// Cursor persisted at the end of a SEFAZ run
    pub last_nsu: Option<Nsu>,
}

/// What happened to one company during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyOutcome {
    /// Not synced
    Skipped {
        /// Company id
        company_id: String,
        /// Why
        reason: SkipReason,
    },
    /// Synced and the attempt completed
    Synced {
        /// Company id
        company_id: String,
        /// Counters
        summary: SyncSummary,
    },
    /// Sync attempted and failed
    Failed {
        /// Company id
        company_id: String,
        /// Method, when one was chosen
        method: Option<SyncMethod>,
        /// Stable error code
        code: ErrorCode,
        /// Sanitized message
        message: String,
    },
}

impl CompanyOutcome {
    /// Company the outcome belongs to.
    #[must_use]
    pub fn company_id(&self) -> &str {
        match self {
            Self::Skipped { company_id, .. }
            | Self::Synced { company_id, .. }
            | Self::Failed { company_id, .. } => company_id,
        }
    }
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Abandoned attempts closed at the start of the tick
    pub reaped: usize,
    /// One entry per auto-sync company, in evaluation order
    pub outcomes: Vec<CompanyOutcome>,
}

impl TickReport {
    /// Outcome for `company_id`, if it was evaluated.
    #[must_use]
    pub fn outcome_for(&self, company_id: &str) -> Option<&CompanyOutcome> {
        self.outcomes.iter().find(|outcome| outcome.company_id() == company_id)
    }

    fn count(&self, predicate: impl Fn(&CompanyOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|outcome| predicate(outcome)).count()
    }
}

enum Plan {
    Skip(SkipReason),
    Sefaz(Box<CertificateBundle>),
    Fallback(String),
}

#[derive(Debug, Default)]
struct Progress {
    cursor: Nsu,
    material_ready: bool,
    new_docs: u32,
    updated_docs: u32,
    skipped_docs: u32,
}

impl Progress {
    fn starting_at(cursor: Nsu) -> Self {
        Self {
            cursor,
            ..Self::default()
        }
    }

    fn advance(&mut self, last_nsu: Nsu) {
        self.cursor = self.cursor.max(last_nsu);
    }
}

/// Runs syncs against the store, SEFAZ and the optional aggregator.
pub struct SyncOrchestrator {
    store: Arc<dyn SyncStore>,
    cipher: Arc<CredentialCipher>,
    connector: Arc<dyn SefazConnector>,
    fallback: Option<Arc<dyn FallbackSource>>,
    settings: OrchestratorSettings,
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator without an aggregator fallback.
    #[must_use]
    pub fn new(
        store: Arc<dyn SyncStore>,
        cipher: Arc<CredentialCipher>,
        connector: Arc<dyn SefazConnector>,
    ) -> Self {
        Self {
            store,
            cipher,
            connector,
            fallback: None,
            settings: OrchestratorSettings::default(),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Use `fallback` for companies without a usable certificate.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Replace the default settings.
    #[must_use]
    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// One pass over every auto-sync company.
    ///
    /// Per-company failures are recorded on their attempts and in the
    /// report; only failing to list companies aborts the tick.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the company list cannot be read.
    #[instrument(skip(self))]
    pub async fn run_tick(&self) -> Result<TickReport, SyncError> {
        let reaped = match self.reap_stale_attempts(Utc::now()).await {
            Ok(reaped) => reaped,
            Err(e) => {
                error!(error = %e, "Failed to reap stale sync attempts");
                0
            }
        };

        let companies = self.store.auto_sync_companies().await?;
        let mut outcomes = Vec::with_capacity(companies.len());
        for company in &companies {
            outcomes.push(self.sync_company(company).await);
        }

        let report = TickReport { reaped, outcomes };
        info!(
            companies = companies.len(),
            synced = report.count(|o| matches!(o, CompanyOutcome::Synced { .. })),
            failed = report.count(|o| matches!(o, CompanyOutcome::Failed { .. })),
            skipped = report.count(|o| matches!(o, CompanyOutcome::Skipped { .. })),
            reaped = report.reaped,
            "Sync tick finished"
        );
        Ok(report)
    }

    /// Evaluate and, if eligible, sync one company.
    #[instrument(skip(self, company), fields(company_id = %company.id))]
    pub async fn sync_company(&self, company: &Company) -> CompanyOutcome {
        let plan = match self.plan(company, Utc::now()).await {
            Ok(plan) => plan,
            Err(e) => return failed(company, None, &e),
        };

        let (method, result) = match plan {
            Plan::Skip(reason) => {
                debug!(reason = ?reason, "Company skipped");
                return CompanyOutcome::Skipped {
                    company_id: company.id.clone(),
                    reason,
                };
            }
            Plan::Sefaz(bundle) => (SyncMethod::Sefaz, self.sync_via_sefaz(company, &bundle).await),
            Plan::Fallback(token) => {
                (SyncMethod::Nsdocs, self.sync_via_fallback(company, &token).await)
            }
        };

        match result {
            Ok(summary) => CompanyOutcome::Synced {
                company_id: company.id.clone(),
                summary,
            },
            Err(SyncError::Store(StoreError::AttemptAlreadyRunning { .. })) => {
                CompanyOutcome::Skipped {
                    company_id: company.id.clone(),
                    reason: SkipReason::AlreadyRunning,
                }
            }
            Err(e) => failed(company, Some(method), &e),
        }
    }

    async fn plan(&self, company: &Company, now: DateTime<Utc>) -> Result<Plan, SyncError> {
        if self.store.running_attempt(&company.id).await?.is_some() {
            return Ok(Plan::Skip(SkipReason::AlreadyRunning));
        }

        if let Some(last) = self.store.last_completed_attempt(&company.id).await? {
            let finished_at = last.completed_at.unwrap_or(last.started_at);
            let next_due =
                finished_at + TimeDelta::minutes(i64::from(company.sync_interval_minutes));
            if next_due > now {
                return Ok(Plan::Skip(SkipReason::SyncedRecently { next_due }));
            }
        }

        let fallback_token = company
            .nsdocs_token
            .as_ref()
            .filter(|token| !token.is_empty())
            .filter(|_| self.fallback.is_some());
        if company.nsdocs_token.is_some() && self.fallback.is_none() {
            debug!("Aggregator token present but no aggregator configured");
        }

        let bundle = self
            .store
            .certificate_bundle(&company.id)
            .await?
            .filter(|bundle| bundle.is_usable_at(now));

        match (bundle, fallback_token) {
            (Some(bundle), token) => match (self.cooldown_until(&company.id, now).await, token) {
                (None, _) => Ok(Plan::Sefaz(Box::new(bundle))),
                (Some(_), Some(token)) => Ok(Plan::Fallback(token.clone())),
                (Some(until), None) => Ok(Plan::Skip(SkipReason::RateLimited { until })),
            },
            (None, Some(token)) => Ok(Plan::Fallback(token.clone())),
            (None, None) => Ok(Plan::Skip(SkipReason::NoSyncSource)),
        }
    }

    /// Sync `company` directly against SEFAZ with its certificate bundle.
    ///
    /// The cursor is persisted whenever the certificate could be opened,
    /// including after a mid-run failure, and never moves backwards.
    ///
    /// # Errors
    ///
    /// The first error of the run; it is also recorded on the attempt.
    #[instrument(
        skip(self, company, bundle),
        fields(company_id = %company.id, cursor = %bundle.last_nsu)
    )]
    pub async fn sync_via_sefaz(
        &self,
        company: &Company,
        bundle: &CertificateBundle,
    ) -> Result<SyncSummary, SyncError> {
        let attempt = self.store.create_attempt(&company.id, SyncMethod::Sefaz, Utc::now()).await?;
        info!(attempt_id = %attempt.id, "SEFAZ sync started");

        let mut progress = Progress::starting_at(bundle.last_nsu);
        let mut result = self.distribute(company, bundle, &mut progress).await;

        if progress.material_ready {
            match self.store.save_cursor(&company.id, progress.cursor, Utc::now()).await {
                Ok(saved) => progress.cursor = saved,
                Err(e) => {
                    error!(attempt_id = %attempt.id, error = %e, "Failed to persist cursor");
                    if result.is_ok() {
                        result = Err(e.into());
                    }
                }
            }
        }

        if let Err(SyncError::Sefaz(SefazError::RateLimited { .. })) = &result {
            self.start_cooldown(&company.id).await;
        }

        self.finish(attempt.id, &result, progress.new_docs, progress.updated_docs)
            .await?;

        result.map(|()| {
            info!(
                attempt_id = %attempt.id,
                new_docs = progress.new_docs,
                updated_docs = progress.updated_docs,
                skipped_docs = progress.skipped_docs,
                last_nsu = %progress.cursor,
                "SEFAZ sync completed"
            );
            SyncSummary {
                attempt_id: attempt.id,
                method: SyncMethod::Sefaz,
                new_docs: progress.new_docs,
                updated_docs: progress.updated_docs,
                skipped_docs: progress.skipped_docs,
                last_nsu: Some(progress.cursor),
            }
        })
    }

    async fn distribute(
        &self,
        company: &Company,
        bundle: &CertificateBundle,
        progress: &mut Progress,
    ) -> Result<(), SyncError> {
        let material = {
            let passphrase = self.cipher.decrypt(&bundle.encrypted_passphrase)?;
            parse_bundle(&bundle.pfx, passphrase.expose_secret())?
        };
        progress.material_ready = true;

        let tax_id = normalize_tax_id(&company.tax_id);
        let jurisdiction = jurisdiction_code(&bundle.subject, &self.settings.default_jurisdiction);
        let client = self.connector.connect(&ConnectRequest {
            material: &material,
            tax_id: &tax_id,
            environment: bundle.environment,
            jurisdiction_code: &jurisdiction,
        })?;
        drop(material);

        for iteration in 1..=self.settings.max_iterations {
            let batch = client.fetch_new_documents(progress.cursor).await?;

            if batch.is_empty() {
                progress.advance(batch.last_nsu);
                debug!(iteration, cursor = %progress.cursor, "No new documents");
                return Ok(());
            }

            for document in &batch.documents {
                self.ingest(company, &tax_id, document, progress).await?;
            }
            progress.skipped_docs += u32::try_from(batch.skipped.len()).unwrap_or(u32::MAX);

            let before = progress.cursor;
            progress.advance(batch.last_nsu);
            debug!(
                iteration,
                documents = batch.documents.len(),
                cursor = %progress.cursor,
                max_nsu = %batch.max_nsu,
                "Batch processed"
            );

            if !batch.has_more() {
                return Ok(());
            }
            if progress.cursor == before && batch.documents.is_empty() {
                warn!(cursor = %progress.cursor, "Distribution made no progress, stopping");
                return Ok(());
            }
        }

        info!(
            max_iterations = self.settings.max_iterations,
            cursor = %progress.cursor,
            "Iteration limit reached, remaining documents wait for the next run"
        );
        Ok(())
    }

    async fn ingest(
        &self,
        company: &Company,
        own_tax_id: &str,
        document: &RawSefazDocument,
        progress: &mut Progress,
    ) -> Result<(), SyncError> {
        let key = match AccessKey::parse(&document.access_key) {
            Ok(key) => key,
            Err(_) => {
                debug!(
                    nsu = %document.nsu,
                    schema = %document.schema,
                    "Document without a usable access key"
                );
                return Ok(());
            }
        };

        match document.kind {
            DocumentKind::Nfe => {
                if self.store.find_invoice(key.as_str()).await?.is_some() {
                    progress.updated_docs += 1;
                    return Ok(());
                }
                let record = invoice_record(company, own_tax_id, &key, document);
                match self.store.insert_invoice(record).await? {
                    InsertOutcome::Inserted => progress.new_docs += 1,
                    InsertOutcome::AlreadyExists => progress.updated_docs += 1,
                }
            }
            DocumentKind::Evento => {
                let cancels = document.content.event().is_some_and(|event| event.is_cancellation());
                if cancels
                    && self
                        .store
                        .update_invoice_status(key.as_str(), InvoiceStatus::Cancelled)
                        .await?
                {
                    info!(access_key = %key, "Invoice marked as cancelled");
                    progress.updated_docs += 1;
                }
            }
        }
        Ok(())
    }

    /// Sync `company` through the aggregator with its sealed token.
    ///
    /// # Errors
    ///
    /// [`SyncError::Fallback`] if no aggregator is configured or it fails,
    /// [`SyncError::Credential`] if the token cannot be opened.
    #[instrument(skip(self, company, sealed_token), fields(company_id = %company.id))]
    pub async fn sync_via_fallback(
        &self,
        company: &Company,
        sealed_token: &str,
    ) -> Result<SyncSummary, SyncError> {
        let Some(fallback) = self.fallback.as_ref() else {
            return Err(FallbackError::Unavailable("no aggregator configured".to_string()).into());
        };

        let attempt = self.store.create_attempt(&company.id, SyncMethod::Nsdocs, Utc::now()).await?;
        info!(attempt_id = %attempt.id, "Aggregator sync started");

        let result: Result<FallbackSummary, SyncError> = async {
            let token: SecretString = self.cipher.decrypt(sealed_token)?;
            Ok(fallback.full_sync(company, &token).await?)
        }
        .await;

        let counts = result.as_ref().map(|summary| *summary).unwrap_or_default();
        let status = result.as_ref().map(|_| ()).map_err(|e| e.sanitized_message());
        self.finish_with(attempt.id, status, counts.new_docs, counts.updated_docs)
            .await?;

        let summary = result?;
        info!(
            attempt_id = %attempt.id,
            new_docs = summary.new_docs,
            updated_docs = summary.updated_docs,
            "Aggregator sync completed"
        );
        Ok(SyncSummary {
            attempt_id: attempt.id,
            method: SyncMethod::Nsdocs,
            new_docs: summary.new_docs,
            updated_docs: summary.updated_docs,
            skipped_docs: 0,
            last_nsu: None,
        })
    }

    /// Close `running` attempts that started before `now - stale_attempt_after`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the running attempts cannot be listed.
    #[instrument(skip(self))]
    pub async fn reap_stale_attempts(&self, now: DateTime<Utc>) -> Result<usize, SyncError> {
        let threshold =
            TimeDelta::from_std(self.settings.stale_attempt_after).unwrap_or(TimeDelta::MAX);
        let minutes = self.settings.stale_attempt_after.as_secs() / 60;
        let mut reaped = 0;

        for attempt in self.store.running_attempts().await? {
            if now.signed_duration_since(attempt.started_at) < threshold {
                continue;
            }
            let outcome = AttemptOutcome::Failed {
                message: format!("Sync abandoned: still running after {minutes} minutes"),
                new_docs: attempt.new_docs,
                updated_docs: attempt.updated_docs,
            };
            match self.store.finish_attempt(attempt.id, outcome, now).await {
                Ok(_) => {
                    warn!(
                        attempt_id = %attempt.id,
                        company_id = %attempt.company_id,
                        "Reaped abandoned sync attempt"
                    );
                    reaped += 1;
                }
                Err(StoreError::AttemptAlreadyFinished(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(reaped)
    }

    /// End of the SEFAZ cooldown for `company_id`, if one is active at `now`.
    pub async fn cooldown_until(
        &self,
        company_id: &str,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let mut cooldowns = self.cooldowns.lock().await;
        match cooldowns.get(company_id) {
            Some(until) if *until > now => Some(*until),
            Some(_) => {
                cooldowns.remove(company_id);
                None
            }
            None => None,
        }
    }

    async fn start_cooldown(&self, company_id: &str) {
        let cooldown =
            TimeDelta::from_std(self.settings.rate_limit_cooldown).unwrap_or(TimeDelta::MAX);
        let until = Utc::now().checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC);
        warn!(
            company_id = %company_id,
            until = %until,
            "SEFAZ rate limit hit, pausing direct sync"
        );
        self.cooldowns.lock().await.insert(company_id.to_string(), until);
    }

    async fn finish(
        &self,
        attempt_id: Uuid,
        result: &Result<(), SyncError>,
        new_docs: u32,
        updated_docs: u32,
    ) -> Result<(), SyncError> {
        let status = result.as_ref().map(|_| ()).map_err(SyncError::sanitized_message);
        self.finish_with(attempt_id, status, new_docs, updated_docs).await
    }

    async fn finish_with(
        &self,
        attempt_id: Uuid,
        status: Result<(), String>,
        new_docs: u32,
        updated_docs: u32,
    ) -> Result<(), SyncError> {
        let outcome = match status {
            Ok(()) => AttemptOutcome::Completed { new_docs, updated_docs },
            Err(message) => {
                warn!(attempt_id = %attempt_id, error = %message, "Sync attempt failed");
                AttemptOutcome::Failed {
                    message,
                    new_docs,
                    updated_docs,
                }
            }
        };
        self.store.finish_attempt(attempt_id, outcome, Utc::now()).await?;
        Ok(())
    }
}

fn failed(company: &Company, method: Option<SyncMethod>, error: &SyncError) -> CompanyOutcome {
    CompanyOutcome::Failed {
        company_id: company.id.clone(),
        method,
        code: error.code(),
        message: error.sanitized_message(),
    }
}

fn invoice_record(
    company: &Company,
    own_tax_id: &str,
    key: &AccessKey,
    document: &RawSefazDocument,
) -> InvoiceRecord {
    let invoice = document.content.invoice();
    let emitter_tax_id = invoice
        .and_then(|content| content.emitter.tax_id.as_deref())
        .map(normalize_tax_id)
        .unwrap_or_else(|| key.emitter_tax_id().to_string());
    let direction = if emitter_tax_id == own_tax_id {
        Direction::Issued
    } else {
        Direction::Received
    };
    let recipient = invoice.and_then(|content| content.recipient.as_ref());

    InvoiceRecord {
        access_key: key.as_str().to_string(),
        company_id: company.id.clone(),
        document_type: key.document_type().unwrap_or(DocumentType::Nfe),
        direction,
        status: InvoiceStatus::Authorized,
        issued_at: invoice.and_then(|content| content.issued_at),
        emitter_tax_id: Some(emitter_tax_id),
        emitter_name: Some(document.emitter_name.clone()).filter(|name| !name.is_empty()),
        recipient_tax_id: recipient.and_then(|party| party.tax_id.as_deref()).map(normalize_tax_id),
        recipient_name: recipient.and_then(|party| party.name.clone()),
        total_cents: invoice.and_then(|content| content.total_cents),
        nsu: document.nsu,
        xml: document.xml.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sefaz::{DfeDocument, InvoiceContent, Party};

    fn company() -> Company {
        Company {
            id: "acme".to_string(),
            name: "ACME".to_string(),
            tax_id: "11.222.333/0001-81".to_string(),
            auto_sync: true,
            sync_interval_minutes: 15,
            nsdocs_token: None,
        }
    }

    fn summary_document(key: &str, emitter: &str) -> RawSefazDocument {
        RawSefazDocument {
            nsu: Nsu::new(3).unwrap(),
            access_key: key.to_string(),
            emitter_name: "Fornecedor".to_string(),
            kind: DocumentKind::Nfe,
            schema: "resNFe_v1.01.xsd".to_string(),
            xml: "<resNFe/>".to_string(),
            content: DfeDocument::InvoiceSummary(InvoiceContent {
                access_key: key.to_string(),
                emitter: Party {
                    tax_id: Some(emitter.to_string()),
                    name: Some("Fornecedor".to_string()),
                },
                recipient: None,
                issued_at: None,
                total_cents: Some(150_075),
            }),
        }
    }

    #[test]
    fn test_received_invoice_record() {
        let key_text = format!("3524014455566600019955001{}", "0".repeat(19));
        let key = AccessKey::parse(&key_text).unwrap();
        let document = summary_document(&key_text, "44.555.666/0001-99");

        let record = invoice_record(&company(), "11222333000181", &key, &document);

        assert_eq!(record.direction, Direction::Received);
        assert_eq!(record.document_type, DocumentType::Nfe);
        assert_eq!(record.emitter_tax_id.as_deref(), Some("44555666000199"));
        assert_eq!(record.total_cents, Some(150_075));
        assert_eq!(record.status, InvoiceStatus::Authorized);
        assert_eq!(record.nsu.value(), 3);
    }

    #[test]
    fn test_issued_invoice_record_from_key() {
        let key_text = format!("3524011122233300018157001{}", "0".repeat(19));
        let key = AccessKey::parse(&key_text).unwrap();
        let mut document = summary_document(&key_text, "");
        document.content = DfeDocument::Unrecognized {
            access_key: Some(key_text.clone()),
            emitter_name: None,
        };
        document.emitter_name = String::new();

        let record = invoice_record(&company(), "11222333000181", &key, &document);

        assert_eq!(record.direction, Direction::Issued);
        assert_eq!(record.document_type, DocumentType::Cte);
        assert!(record.emitter_name.is_none());
        assert!(record.total_cents.is_none());
    }

    #[test]
    fn test_progress_never_moves_backwards() {
        let mut progress = Progress::starting_at(Nsu::new(10).unwrap());
        progress.advance(Nsu::new(4).unwrap());
        assert_eq!(progress.cursor.value(), 10);
        progress.advance(Nsu::new(12).unwrap());
        assert_eq!(progress.cursor.value(), 12);
    }

    #[test]
    fn test_default_settings() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.max_iterations, 50);
        assert_eq!(settings.rate_limit_cooldown, Duration::from_secs(3600));
        assert_eq!(settings.stale_attempt_after, Duration::from_secs(1800));
        assert_eq!(settings.default_jurisdiction, "35");
    }
}
