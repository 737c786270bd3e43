//! Credential cipher error types.

use thiserror::Error;

/// Errors raised while sealing or opening a stored secret.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// No master key was configured
    #[error("Credential master key is not configured")]
    MissingMasterKey,

    /// The stored value does not have the `salt:iv:tag:ciphertext` shape
    #[error("Malformed stored secret: {0}")]
    Malformed(String),

    /// A component is not valid hexadecimal
    #[error("Stored secret is not valid hex: {0}")]
    InvalidEncoding(String),

    /// Authentication failed (wrong master key or tampered value)
    #[error("Stored secret failed authentication")]
    AuthenticationFailed,

    /// Key derivation rejected its parameters
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
}

impl CipherError {
    /// Create a malformed-secret error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}
