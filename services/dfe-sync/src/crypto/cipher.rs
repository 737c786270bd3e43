//! AES-256-GCM credential cipher with scrypt key derivation.

use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroizing;

use super::error::CipherError;

/// AES-256-GCM with the standard 96-bit nonce.
type Aes256Gcm12 = AesGcm<Aes256, U12>;
/// AES-256-GCM with a 128-bit nonce, the width new values are written with.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Salt used by values sealed before per-value salts were introduced.
const LEGACY_SALT: &[u8] = b"salt";

/// Seals and opens secrets stored at rest.
///
/// The master key never leaves this struct; derived keys are zeroized on drop.
pub struct CredentialCipher {
    master_key: SecretString,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialCipher {
    /// Create a cipher bound to `master_key`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MissingMasterKey`] if the key is empty.
    pub fn new(master_key: SecretString) -> Result<Self, CipherError> {
        if master_key.expose_secret().is_empty() {
            return Err(CipherError::MissingMasterKey);
        }
        Ok(Self { master_key })
    }

    /// Seal `plaintext` as `salt:iv:tag:ciphertext`, each part hex encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation or encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut iv);

        let key = self.derive_key(&salt)?;
        let cipher = Aes256Gcm16::new_from_slice(key.as_slice())
            .map_err(|e| CipherError::EncryptionFailed(e.to_string()))?;

        let sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| CipherError::EncryptionFailed(format!("AES-GCM encrypt failed: {e}")))?;

        // AES-GCM appends the tag to the ciphertext; store it separately.
        let (ciphertext, tag) = sealed.split_at(sealed.len().saturating_sub(TAG_LEN));

        Ok(format!(
            "{}:{}:{}:{}",
            hex::encode(salt),
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Open a stored value.
    ///
    /// Accepts the current four-part format and the legacy three-part
    /// `iv:tag:ciphertext` format sealed with a fixed salt. Both 12- and
    /// 16-byte IVs are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Malformed`] or [`CipherError::InvalidEncoding`]
    /// for values that cannot be split and decoded, and
    /// [`CipherError::AuthenticationFailed`] when the tag does not verify.
    pub fn decrypt(&self, stored: &str) -> Result<SecretString, CipherError> {
        let parts: Vec<&str> = stored.trim().split(':').collect();
        let (salt, iv, tag, ciphertext) = match parts.as_slice() {
            [salt, iv, tag, ct] => {
                (decode_hex(salt)?, decode_hex(iv)?, decode_hex(tag)?, decode_hex(ct)?)
            }
            [iv, tag, ct] => {
                (LEGACY_SALT.to_vec(), decode_hex(iv)?, decode_hex(tag)?, decode_hex(ct)?)
            }
            _ => {
                return Err(CipherError::malformed(format!(
                    "expected 3 or 4 ':'-separated parts, found {}",
                    parts.len()
                )));
            }
        };

        if tag.len() != TAG_LEN {
            return Err(CipherError::malformed("authentication tag must be 16 bytes"));
        }

        let key = self.derive_key(&salt)?;
        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = Zeroizing::new(match iv.len() {
            12 => Aes256Gcm12::new_from_slice(key.as_slice())
                .map_err(|_| CipherError::AuthenticationFailed)?
                .decrypt(Nonce::<U12>::from_slice(&iv), sealed.as_slice()),
            16 => Aes256Gcm16::new_from_slice(key.as_slice())
                .map_err(|_| CipherError::AuthenticationFailed)?
                .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice()),
            other => {
                return Err(CipherError::malformed(format!(
                    "IV must be 12 or 16 bytes, got {other}"
                )));
            }
        }
        .map_err(|_| CipherError::AuthenticationFailed)?);

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CipherError::malformed("plaintext is not UTF-8"))?;
        Ok(SecretString::from(text.to_owned()))
    }

    fn derive_key(&self, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CipherError> {
        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(
            self.master_key.expose_secret().as_bytes(),
            salt,
            &params,
            key.as_mut_slice(),
        )
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }
}

fn decode_hex(part: &str) -> Result<Vec<u8>, CipherError> {
    hex::decode(part).map_err(|e| CipherError::InvalidEncoding(e.to_string()))
}
