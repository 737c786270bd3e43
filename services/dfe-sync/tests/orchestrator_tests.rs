//! End-to-end sync runs: in-memory store, sealed credentials, generated
//! certificates and a mocked SEFAZ endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use dfe_sync::crypto::CredentialCipher;
use dfe_sync::error::ErrorCode;
use dfe_sync::sefaz::{DocumentType, Environment, HttpSefazConnector, Nsu, SefazEndpoints};
use dfe_sync::sync::{
    AttemptStatus, CertificateBundle, Company, CompanyOutcome, Direction, FallbackError,
    FallbackSource, FallbackSummary, InMemoryStore, InvoiceStatus, OrchestratorSettings, SkipReason,
    SyncAttempt, SyncMethod, SyncOrchestrator, SyncStore,
};
use rust_common::HttpConfig;
use secrecy::{ExposeSecret, SecretString};
use test_utils::{
    COMPANY_CNPJ, CertificateFixture, DocZipFixture, SUPPLIER_CNPJ, access_key, dist_response,
    nfe_proc_xml, proc_evento_xml, res_nfe_xml,
};
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPANY_ID: &str = "company-1";
const CERT_PASS: &str = "cert-pass";

struct Harness {
    server: MockServer,
    store: InMemoryStore,
    cipher: Arc<CredentialCipher>,
    certificate: CertificateFixture,
}

impl Harness {
    async fn start() -> Self {
        let master_key = SecretString::from("integration-master-key-0001".to_string());
        let cipher = CredentialCipher::new(master_key).unwrap();
        Self {
            server: MockServer::start().await,
            store: InMemoryStore::new(),
            cipher: Arc::new(cipher),
            certificate: CertificateFixture::self_signed(
                "EMPRESA TESTE LTDA",
                COMPANY_CNPJ,
                "SP",
                CERT_PASS,
            ),
        }
    }

    fn orchestrator(&self) -> SyncOrchestrator {
        self.orchestrator_with(OrchestratorSettings::default())
    }

    fn orchestrator_with(&self, settings: OrchestratorSettings) -> SyncOrchestrator {
        let url = Url::parse(&format!("{}/ws/NFeDistribuicaoDFe.asmx", self.server.uri())).unwrap();
        let endpoints = SefazEndpoints {
            production: url.clone(),
            homologation: url,
        };
        let http = HttpConfig::default().with_timeout(Duration::from_secs(5));
        let connector = HttpSefazConnector::new(endpoints, http);
        SyncOrchestrator::new(
            Arc::new(self.store.clone()),
            Arc::clone(&self.cipher),
            Arc::new(connector),
        )
        .with_settings(settings)
    }

    async fn seed_company(&self, token: Option<&str>) -> Company {
        let company = Company {
            id: COMPANY_ID.to_string(),
            name: "Empresa Teste Ltda".to_string(),
            tax_id: "11.222.333/0001-81".to_string(),
            auto_sync: true,
            sync_interval_minutes: 15,
            nsdocs_token: token.map(|t| self.cipher.encrypt(t).unwrap()),
        };
        self.store.upsert_company(company.clone()).await;
        company
    }

    async fn seed_certificate(&self, last_nsu: u64, sealed_passphrase: &str) {
        self.store
            .put_bundle(CertificateBundle {
                company_id: COMPANY_ID.to_string(),
                pfx: self.certificate.pfx.clone(),
                encrypted_passphrase: self.cipher.encrypt(sealed_passphrase).unwrap(),
                environment: Environment::Production,
                subject: format!("C=BR, ST=SP, L=SAO PAULO, CN=EMPRESA TESTE LTDA:{COMPANY_CNPJ}"),
                last_nsu: Nsu::new(last_nsu).unwrap(),
                last_sync_at: None,
                valid_to: None,
            })
            .await;
    }

    async fn bundle(&self) -> CertificateBundle {
        self.store.certificate_bundle(COMPANY_ID).await.unwrap().unwrap()
    }

    async fn requests(&self) -> usize {
        self.server.received_requests().await.unwrap().len()
    }
}

fn soap_ok(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/soap+xml; charset=utf-8")
        .set_body_string(body)
}

fn cursor(nsu: u64) -> String {
    format!("<ultNSU>{nsu:015}</ultNSU>")
}

fn supplier_summary(nsu: u64, number: u32) -> DocZipFixture {
    let key = access_key(SUPPLIER_CNPJ, "55", number);
    DocZipFixture::compressed(
        nsu,
        "resNFe_v1.01.xsd",
        &res_nfe_xml(&key, SUPPLIER_CNPJ, "FORNECEDOR SA", "1500.75", "2024-01-15T10:30:00-03:00"),
    )
}

fn attempt(status: AttemptStatus, started_ago: TimeDelta) -> SyncAttempt {
    let started_at = Utc::now() - started_ago;
    SyncAttempt {
        id: Uuid::new_v4(),
        company_id: COMPANY_ID.to_string(),
        sync_method: SyncMethod::Sefaz,
        status,
        new_docs: 0,
        updated_docs: 0,
        error_message: None,
        started_at,
        completed_at: (status != AttemptStatus::Running)
            .then_some(started_at + TimeDelta::seconds(30)),
    }
}

#[derive(Default)]
struct RecordingFallback {
    tokens: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl FallbackSource for RecordingFallback {
    async fn full_sync(
        &self,
        _company: &Company,
        token: &SecretString,
    ) -> Result<FallbackSummary, FallbackError> {
        self.tokens.lock().unwrap().push(token.expose_secret().to_string());
        if self.fail {
            return Err(FallbackError::Unauthorized);
        }
        Ok(FallbackSummary {
            new_docs: 4,
            updated_docs: 1,
        })
    }
}

#[tokio::test]
async fn test_first_sync_stores_every_document() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;

    let issued_key = access_key(COMPANY_CNPJ, "55", 3);
    let docs = [
        supplier_summary(1, 1),
        supplier_summary(2, 2),
        DocZipFixture::compressed(
            3,
            "procNFe_v4.00.xsd",
            &nfe_proc_xml(
                &issued_key,
                COMPANY_CNPJ,
                "EMPRESA TESTE LTDA",
                SUPPLIER_CNPJ,
                "FORNECEDOR SA",
                "250.00",
                "2024-01-15T11:00:00-03:00",
            ),
        ),
    ];
    Mock::given(method("POST"))
        .and(body_string_contains(cursor(0)))
        .and(body_string_contains("<cUFAutor>35</cUFAutor><CNPJ>11222333000181</CNPJ>"))
        .respond_with(soap_ok(dist_response(138, "Documento(s) localizado(s)", 3, 3, &docs)))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    let Some(CompanyOutcome::Synced { summary, .. }) = report.outcome_for(COMPANY_ID) else {
        panic!("expected a completed sync, got {report:?}");
    };
    assert_eq!(summary.method, SyncMethod::Sefaz);
    assert_eq!(summary.new_docs, 3);
    assert_eq!(summary.updated_docs, 0);
    assert_eq!(summary.last_nsu, Some(Nsu::new(3).unwrap()));

    let invoices = h.store.invoices_for(COMPANY_ID).await;
    assert_eq!(invoices.len(), 3);
    assert!(invoices.iter().all(|r| r.document_type == DocumentType::Nfe));
    assert!(invoices.iter().all(|r| r.status == InvoiceStatus::Authorized));

    let received = &invoices[0];
    assert_eq!(received.direction, Direction::Received);
    assert_eq!(received.emitter_tax_id.as_deref(), Some(SUPPLIER_CNPJ));
    assert_eq!(received.total_cents, Some(150_075));

    let issued = invoices.iter().find(|r| r.access_key == issued_key).unwrap();
    assert_eq!(issued.direction, Direction::Issued);
    assert_eq!(issued.recipient_tax_id.as_deref(), Some(SUPPLIER_CNPJ));

    let bundle = h.bundle().await;
    assert_eq!(bundle.last_nsu.value(), 3);
    assert!(bundle.last_sync_at.is_some());

    let attempts = h.store.attempts_for(COMPANY_ID).await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Completed);
    assert_eq!(attempts[0].new_docs, 3);
    assert!(attempts[0].completed_at.is_some());
}

#[tokio::test]
async fn test_rerun_against_unchanged_remote_creates_nothing() {
    let h = Harness::start().await;
    let company = h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;

    let docs = [supplier_summary(1, 1), supplier_summary(2, 2)];
    Mock::given(method("POST"))
        .respond_with(soap_ok(dist_response(138, "Documento(s) localizado(s)", 2, 2, &docs)))
        .mount(&h.server)
        .await;

    let orchestrator = h.orchestrator();
    let first = orchestrator.sync_via_sefaz(&company, &h.bundle().await).await.unwrap();
    assert_eq!(first.new_docs, 2);

    let second = orchestrator.sync_via_sefaz(&company, &h.bundle().await).await.unwrap();
    assert_eq!(second.new_docs, 0);
    assert_eq!(second.updated_docs, 2);
    assert_eq!(h.store.invoices_for(COMPANY_ID).await.len(), 2);
    assert_eq!(h.bundle().await.last_nsu.value(), 2);
}

#[tokio::test]
async fn test_running_attempt_skips_company() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;
    h.store
        .put_attempt(attempt(AttemptStatus::Running, TimeDelta::minutes(2)))
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    assert_eq!(report.reaped, 0);
    assert!(matches!(
        report.outcome_for(COMPANY_ID),
        Some(CompanyOutcome::Skipped {
            reason: SkipReason::AlreadyRunning,
            ..
        })
    ));
    assert_eq!(h.requests().await, 0);
    assert_eq!(h.store.attempts_for(COMPANY_ID).await.len(), 1);
}

#[tokio::test]
async fn test_recent_completion_skips_until_interval_elapses() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;
    h.store
        .put_attempt(attempt(AttemptStatus::Completed, TimeDelta::minutes(5)))
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    match report.outcome_for(COMPANY_ID) {
        Some(CompanyOutcome::Skipped {
            reason: SkipReason::SyncedRecently { next_due },
            ..
        }) => assert!(*next_due > Utc::now()),
        other => panic!("expected SyncedRecently, got {other:?}"),
    }
    assert_eq!(h.requests().await, 0);
}

#[tokio::test]
async fn test_failed_attempt_does_not_delay_next_run() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;
    h.store
        .put_attempt(attempt(AttemptStatus::Error, TimeDelta::minutes(1)))
        .await;
    Mock::given(method("POST"))
        .respond_with(soap_ok(dist_response(137, "Nenhum documento localizado", 0, 0, &[])))
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    assert!(matches!(report.outcome_for(COMPANY_ID), Some(CompanyOutcome::Synced { .. })));
}

#[tokio::test]
async fn test_mid_run_failure_keeps_processed_cursor() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(10, CERT_PASS).await;

    Mock::given(method("POST"))
        .and(body_string_contains(cursor(10)))
        .respond_with(soap_ok(dist_response(
            138,
            "Documento(s) localizado(s)",
            12,
            20,
            &[supplier_summary(11, 11), supplier_summary(12, 12)],
        )))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains(cursor(12)))
        .respond_with(soap_ok(dist_response(
            589,
            "Rejeicao: Numero do NSU informado superior ao maior NSU da base de dados",
            0,
            0,
            &[],
        )))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    match report.outcome_for(COMPANY_ID) {
        Some(CompanyOutcome::Failed { code, message, method, .. }) => {
            assert_eq!(*code, ErrorCode::Protocol);
            assert_eq!(*method, Some(SyncMethod::Sefaz));
            assert!(message.contains("589"));
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    assert_eq!(h.bundle().await.last_nsu.value(), 12);
    assert_eq!(h.store.invoices_for(COMPANY_ID).await.len(), 2);

    let attempts = h.store.attempts_for(COMPANY_ID).await;
    assert_eq!(attempts[0].status, AttemptStatus::Error);
    assert_eq!(attempts[0].new_docs, 2);
    assert!(attempts[0].error_message.as_deref().unwrap().contains("589"));
}

#[tokio::test]
async fn test_soap_fault_reason_reaches_attempt() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;

    let fault = concat!(
        r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>"#,
        r#"<soap:Fault><soap:Code><soap:Value>soap:Receiver</soap:Value></soap:Code>"#,
        r#"<soap:Reason><soap:Text xml:lang="pt">Certificado nao autorizado</soap:Text></soap:Reason>"#,
        r#"</soap:Fault></soap:Body></soap:Envelope>"#
    );
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string(fault))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    match report.outcome_for(COMPANY_ID) {
        Some(CompanyOutcome::Failed { code, message, .. }) => {
            assert_eq!(*code, ErrorCode::Protocol);
            assert!(message.contains("Certificado nao autorizado"));
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    let attempts = h.store.attempts_for(COMPANY_ID).await;
    assert_eq!(attempts[0].status, AttemptStatus::Error);
    assert!(attempts[0].error_message.as_deref().unwrap().contains("Certificado nao autorizado"));
    assert_eq!(h.bundle().await.last_nsu, Nsu::ZERO);
}

#[tokio::test]
async fn test_pagination_follows_cursor_until_caught_up() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;

    Mock::given(method("POST"))
        .and(body_string_contains(cursor(0)))
        .respond_with(soap_ok(dist_response(
            138,
            "Documento(s) localizado(s)",
            1,
            2,
            &[supplier_summary(1, 1)],
        )))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains(cursor(1)))
        .respond_with(soap_ok(dist_response(
            138,
            "Documento(s) localizado(s)",
            2,
            2,
            &[supplier_summary(2, 2)],
        )))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    let Some(CompanyOutcome::Synced { summary, .. }) = report.outcome_for(COMPANY_ID) else {
        panic!("expected a completed sync, got {report:?}");
    };
    assert_eq!(summary.new_docs, 2);
    assert_eq!(h.bundle().await.last_nsu.value(), 2);
    assert_eq!(h.requests().await, 2);
}

#[tokio::test]
async fn test_iteration_cap_leaves_remainder_for_next_run() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;

    for n in 0..3u64 {
        Mock::given(method("POST"))
            .and(body_string_contains(cursor(n)))
            .respond_with(soap_ok(dist_response(
                138,
                "Documento(s) localizado(s)",
                n + 1,
                100,
                &[supplier_summary(n + 1, u32::try_from(n + 1).unwrap())],
            )))
            .mount(&h.server)
            .await;
    }

    let settings = OrchestratorSettings {
        max_iterations: 2,
        ..OrchestratorSettings::default()
    };
    let report = h.orchestrator_with(settings).run_tick().await.unwrap();

    assert!(matches!(report.outcome_for(COMPANY_ID), Some(CompanyOutcome::Synced { .. })));
    assert_eq!(h.requests().await, 2);
    assert_eq!(h.bundle().await.last_nsu.value(), 2);
}

#[tokio::test]
async fn test_empty_answer_honors_server_cursor() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(5, CERT_PASS).await;

    Mock::given(method("POST"))
        .and(body_string_contains(cursor(5)))
        .respond_with(soap_ok(dist_response(137, "Nenhum documento localizado", 9, 9, &[])))
        .expect(1)
        .mount(&h.server)
        .await;

    h.orchestrator().run_tick().await.unwrap();

    assert_eq!(h.bundle().await.last_nsu.value(), 9);
    assert!(h.store.invoices_for(COMPANY_ID).await.is_empty());
}

#[tokio::test]
async fn test_rate_limit_fails_attempt_and_starts_cooldown() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(7, CERT_PASS).await;
    Mock::given(method("POST"))
        .respond_with(soap_ok(dist_response(656, "Rejeicao: Consumo Indevido", 7, 7, &[])))
        .expect(1)
        .mount(&h.server)
        .await;

    let orchestrator = h.orchestrator();
    let report = orchestrator.run_tick().await.unwrap();

    match report.outcome_for(COMPANY_ID) {
        Some(CompanyOutcome::Failed { code, message, .. }) => {
            assert_eq!(*code, ErrorCode::RateLimited);
            assert!(message.contains("656"));
            assert!(message.contains("Retry after 60 minutes"));
        }
        other => panic!("expected a rate-limit failure, got {other:?}"),
    }
    assert_eq!(h.bundle().await.last_nsu.value(), 7);
    assert!(orchestrator.cooldown_until(COMPANY_ID, Utc::now()).await.is_some());

    let report = orchestrator.run_tick().await.unwrap();
    assert!(matches!(
        report.outcome_for(COMPANY_ID),
        Some(CompanyOutcome::Skipped {
            reason: SkipReason::RateLimited { .. },
            ..
        })
    ));
    assert_eq!(h.requests().await, 1);
}

#[tokio::test]
async fn test_cooldown_switches_to_aggregator_when_token_present() {
    let h = Harness::start().await;
    h.seed_company(Some("nsdocs-token-123")).await;
    h.seed_certificate(0, CERT_PASS).await;
    Mock::given(method("POST"))
        .respond_with(soap_ok(dist_response(656, "Rejeicao: Consumo Indevido", 0, 0, &[])))
        .mount(&h.server)
        .await;

    let fallback = Arc::new(RecordingFallback::default());
    let orchestrator = h
        .orchestrator()
        .with_fallback(Arc::clone(&fallback) as Arc<dyn FallbackSource>);

    let first = orchestrator.run_tick().await.unwrap();
    assert!(matches!(first.outcome_for(COMPANY_ID), Some(CompanyOutcome::Failed { .. })));

    let second = orchestrator.run_tick().await.unwrap();
    let Some(CompanyOutcome::Synced { summary, .. }) = second.outcome_for(COMPANY_ID) else {
        panic!("expected aggregator sync, got {second:?}");
    };
    assert_eq!(summary.method, SyncMethod::Nsdocs);
    assert_eq!(summary.new_docs, 4);
    assert_eq!(summary.updated_docs, 1);
    assert_eq!(*fallback.tokens.lock().unwrap(), vec!["nsdocs-token-123".to_string()]);
}

#[tokio::test]
async fn test_aggregator_used_without_certificate() {
    let h = Harness::start().await;
    h.seed_company(Some("nsdocs-token-123")).await;

    let fallback = Arc::new(RecordingFallback::default());
    let orchestrator = h
        .orchestrator()
        .with_fallback(Arc::clone(&fallback) as Arc<dyn FallbackSource>);
    let report = orchestrator.run_tick().await.unwrap();

    assert!(matches!(report.outcome_for(COMPANY_ID), Some(CompanyOutcome::Synced { .. })));
    let attempts = h.store.attempts_for(COMPANY_ID).await;
    assert_eq!(attempts[0].sync_method, SyncMethod::Nsdocs);
    assert_eq!(attempts[0].status, AttemptStatus::Completed);
    assert_eq!(attempts[0].new_docs, 4);
    assert_eq!(h.requests().await, 0);
}

#[tokio::test]
async fn test_aggregator_failure_is_recorded() {
    let h = Harness::start().await;
    h.seed_company(Some("nsdocs-token-123")).await;

    let fallback = Arc::new(RecordingFallback {
        fail: true,
        ..RecordingFallback::default()
    });
    let report = h
        .orchestrator()
        .with_fallback(fallback as Arc<dyn FallbackSource>)
        .run_tick()
        .await
        .unwrap();

    match report.outcome_for(COMPANY_ID) {
        Some(CompanyOutcome::Failed { code, method, .. }) => {
            assert_eq!(*code, ErrorCode::Fallback);
            assert_eq!(*method, Some(SyncMethod::Nsdocs));
        }
        other => panic!("expected aggregator failure, got {other:?}"),
    }
    let attempts = h.store.attempts_for(COMPANY_ID).await;
    assert_eq!(attempts[0].status, AttemptStatus::Error);
    assert!(attempts[0].error_message.is_some());
}

#[tokio::test]
async fn test_no_source_skips_company() {
    let h = Harness::start().await;
    h.seed_company(Some("nsdocs-token-123")).await;

    let report = h.orchestrator().run_tick().await.unwrap();

    assert!(matches!(
        report.outcome_for(COMPANY_ID),
        Some(CompanyOutcome::Skipped {
            reason: SkipReason::NoSyncSource,
            ..
        })
    ));
    assert!(h.store.attempts_for(COMPANY_ID).await.is_empty());
}

#[tokio::test]
async fn test_stale_attempt_is_reaped_before_sync() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;
    let stale = attempt(AttemptStatus::Running, TimeDelta::hours(2));
    let stale_id = stale.id;
    h.store.put_attempt(stale).await;
    Mock::given(method("POST"))
        .respond_with(soap_ok(dist_response(137, "Nenhum documento localizado", 0, 0, &[])))
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    assert_eq!(report.reaped, 1);
    assert!(matches!(report.outcome_for(COMPANY_ID), Some(CompanyOutcome::Synced { .. })));

    let attempts = h.store.attempts_for(COMPANY_ID).await;
    let reaped = attempts.iter().find(|a| a.id == stale_id).unwrap();
    assert_eq!(reaped.status, AttemptStatus::Error);
    assert!(reaped.error_message.as_deref().unwrap().contains("abandoned"));
    assert!(attempts.iter().any(|a| a.id != stale_id && a.status == AttemptStatus::Completed));
}

#[tokio::test]
async fn test_corrupted_document_does_not_abort_batch() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;
    let docs = [
        supplier_summary(1, 1),
        DocZipFixture::corrupted(2, "resNFe_v1.01.xsd"),
        supplier_summary(3, 3),
    ];
    Mock::given(method("POST"))
        .respond_with(soap_ok(dist_response(138, "Documento(s) localizado(s)", 3, 3, &docs)))
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    let Some(CompanyOutcome::Synced { summary, .. }) = report.outcome_for(COMPANY_ID) else {
        panic!("expected a completed sync, got {report:?}");
    };
    assert_eq!(summary.new_docs, 2);
    assert_eq!(summary.skipped_docs, 1);
    assert_eq!(h.bundle().await.last_nsu.value(), 3);
}

#[tokio::test]
async fn test_cancellation_event_marks_invoice() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;
    let key = access_key(SUPPLIER_CNPJ, "55", 1);
    let docs = [
        supplier_summary(1, 1),
        DocZipFixture::compressed(
            2,
            "procEventoNFe_v1.00.xsd",
            &proc_evento_xml(&key, SUPPLIER_CNPJ, "110111", "Cancelamento"),
        ),
    ];
    Mock::given(method("POST"))
        .respond_with(soap_ok(dist_response(138, "Documento(s) localizado(s)", 2, 2, &docs)))
        .mount(&h.server)
        .await;

    let report = h.orchestrator().run_tick().await.unwrap();

    let Some(CompanyOutcome::Synced { summary, .. }) = report.outcome_for(COMPANY_ID) else {
        panic!("expected a completed sync, got {report:?}");
    };
    assert_eq!(summary.new_docs, 1);
    assert_eq!(summary.updated_docs, 1);
    let record = h.store.find_invoice(&key).await.unwrap().unwrap();
    assert_eq!(record.status, InvoiceStatus::Cancelled);
}

#[tokio::test]
async fn test_wrong_passphrase_fails_without_touching_cursor() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(4, "not-the-passphrase").await;

    let report = h.orchestrator().run_tick().await.unwrap();

    match report.outcome_for(COMPANY_ID) {
        Some(CompanyOutcome::Failed { code, message, .. }) => {
            assert_eq!(*code, ErrorCode::CertificateFormat);
            assert!(!message.contains("not-the-passphrase"));
        }
        other => panic!("expected a certificate failure, got {other:?}"),
    }
    let bundle = h.bundle().await;
    assert_eq!(bundle.last_nsu.value(), 4);
    assert!(bundle.last_sync_at.is_none());
    assert_eq!(h.requests().await, 0);
}

#[tokio::test]
async fn test_expired_certificate_is_not_used() {
    let h = Harness::start().await;
    h.seed_company(None).await;
    h.seed_certificate(0, CERT_PASS).await;
    let mut bundle = h.bundle().await;
    bundle.valid_to = Some(Utc::now() - TimeDelta::days(1));
    h.store.put_bundle(bundle).await;

    let report = h.orchestrator().run_tick().await.unwrap();

    assert!(matches!(
        report.outcome_for(COMPANY_ID),
        Some(CompanyOutcome::Skipped {
            reason: SkipReason::NoSyncSource,
            ..
        })
    ));
}
