//! Envelope encryption for secrets at rest.
//!
//! Certificate passphrases and aggregator tokens are stored as
//! `salt:iv:tag:ciphertext` (hex) sealed with AES-256-GCM under a key
//! derived by scrypt from the operator master key.

mod cipher;
mod error;

pub use cipher::CredentialCipher;
pub use error::CipherError;
