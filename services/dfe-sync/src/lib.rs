//! DF-e Sync Service - SEFAZ NF-e distribution sync.
//!
//! This crate provides the core of the fiscal document sync:
//! sealed credential storage, PKCS#12 certificate handling, the mutual-TLS
//! `NFeDistribuicaoDFe` client and the per-company sync orchestration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificate;
pub mod config;
pub mod crypto;
pub mod error;
pub mod sefaz;
pub mod shutdown;
pub mod sync;

pub use config::{Config, ConfigError};
pub use crypto::{CipherError, CredentialCipher};
pub use error::{ErrorCode, SyncError};
pub use sync::{InMemoryStore, Scheduler, SyncOrchestrator, SyncStore};
