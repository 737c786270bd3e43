//! DF-e Sync Service - Main Entry Point
//!
//! Loads configuration, wires the sync components and runs the scheduler
//! until SIGINT/SIGTERM.
//!
//! With `SYNC_ROSTER_FILE` set, cursors are written back to the roster file.
//! Attempts and invoices live in memory for the life of the process.

use std::sync::Arc;

use anyhow::Context;
use dfe_sync::certificate::describe_bundle;
use dfe_sync::config::Config;
use dfe_sync::crypto::CredentialCipher;
use dfe_sync::sefaz::HttpSefazConnector;
use dfe_sync::shutdown::wait_for_signal;
use dfe_sync::sync::{InMemoryStore, RosterStore, Scheduler, SyncOrchestrator, SyncStore};
use rust_common::{TracingConfig, init_tracing};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    let tracing_config = TracingConfig::default()
        .with_service_name("dfe-sync-service")
        .with_log_level(config.log_level.clone())
        .with_json_output(config.log_json);
    init_tracing(&tracing_config).context("failed to initialise tracing")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting DF-e Sync Service");

    let cipher = Arc::new(
        CredentialCipher::new(SecretString::from(
            config.credential_master_key.expose_secret().to_owned(),
        ))
        .context("invalid credential master key")?,
    );

    let store: Arc<dyn SyncStore> = match &config.roster_file {
        Some(path) => {
            let roster = RosterStore::open(path).await.context("failed to load roster")?;
            inspect_certificates(roster.memory(), &cipher).await;
            Arc::new(roster)
        }
        None => {
            warn!("SYNC_ROSTER_FILE not set, no companies to sync");
            Arc::new(InMemoryStore::new())
        }
    };

    let connector = HttpSefazConnector::new(config.endpoints(), config.http_config()?);
    let orchestrator = SyncOrchestrator::new(store, cipher, Arc::new(connector))
        .with_settings(config.orchestrator_settings());

    let scheduler = Scheduler::new(Arc::new(orchestrator), config.tick_interval());
    scheduler.start().await?;

    wait_for_signal().await;

    scheduler.stop(config.shutdown_timeout()).await?;
    info!("DF-e Sync Service stopped");
    Ok(())
}

/// Log subject and validity of each roster certificate and fill in the
/// subject and expiry the roster left out. Bundles that cannot be opened
/// are only reported; their sync attempts will record the failure.
async fn inspect_certificates(store: &InMemoryStore, cipher: &CredentialCipher) {
    let companies = match store.auto_sync_companies().await {
        Ok(companies) => companies,
        Err(e) => {
            warn!(error = %e, "Cannot list companies");
            return;
        }
    };

    for company in companies {
        let Ok(Some(bundle)) = store.certificate_bundle(&company.id).await else {
            continue;
        };
        let description = cipher
            .decrypt(&bundle.encrypted_passphrase)
            .map_err(|e| e.to_string())
            .and_then(|passphrase| {
                describe_bundle(&bundle.pfx, passphrase.expose_secret()).map_err(|e| e.to_string())
            });
        match description {
            Ok(description) => {
                info!(
                    company_id = %company.id,
                    subject = %description.subject,
                    valid_to = %description.valid_to,
                    tax_id = description.tax_id.as_deref().unwrap_or("-"),
                    "Certificate loaded"
                );
                if bundle.subject.is_empty() || bundle.valid_to.is_none() {
                    let mut bundle = bundle;
                    if bundle.subject.is_empty() {
                        bundle.subject = description.subject;
                    }
                    bundle.valid_to = bundle.valid_to.or(Some(description.valid_to));
                    store.put_bundle(bundle).await;
                }
            }
            Err(reason) => {
                warn!(company_id = %company.id, reason = %reason, "Certificate cannot be opened");
            }
        }
    }
}
