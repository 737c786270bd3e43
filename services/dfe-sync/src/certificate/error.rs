//! Certificate bundle error types.

use thiserror::Error;

/// Errors raised while opening a PKCS#12 bundle.
///
/// None of these are retryable: a bad passphrase or a bundle without a key
/// will not become valid on retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// The passphrase does not open the bundle
    #[error("Certificate passphrase is invalid")]
    InvalidPassphrase,

    /// No end-entity certificate bag was found
    #[error("No certificate found in bundle")]
    CertificateNotFound,

    /// Neither a shrouded nor a plain key bag was found
    #[error("No private key found in bundle")]
    KeyNotFound,

    /// The container or a certificate inside it could not be decoded
    #[error("Malformed certificate bundle: {0}")]
    Malformed(String),
}
