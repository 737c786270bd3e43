//! PKCS#12 → PEM extraction.

use chrono::{DateTime, Utc};
use der::asn1::{AnyRef, ContextSpecific, OctetString};
use der::oid::ObjectIdentifier;
use der::{Any, Decode, Encode};
use p12_keystore::error::Error as KeyStoreError;
use p12_keystore::{KeyStore, KeyStoreEntry};
use pem::Pem;
use pkcs12::authenticated_safe::AuthenticatedSafe;
use pkcs12::cert_type::CertBag;
use pkcs12::pfx::Pfx;
use pkcs12::safe_bag::SafeContents;
use rust_common::ClientIdentity;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use zeroize::Zeroizing;

use super::error::CertificateError;
use super::subject::tax_id_from_common_name;

/// PKCS#7 `data` content type.
const DATA_CONTENT_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// PEM pair extracted from a bundle, ready for a mutual-TLS client.
#[derive(Clone)]
pub struct PemMaterial {
    /// End-entity certificate (`CERTIFICATE`)
    pub certificate_pem: String,
    /// PKCS#8 private key (`PRIVATE KEY`)
    pub private_key_pem: SecretString,
}

impl PemMaterial {
    /// Identity presented to SEFAZ during the TLS handshake.
    #[must_use]
    pub fn to_identity(&self) -> ClientIdentity {
        ClientIdentity::from_pem(
            self.certificate_pem.clone(),
            self.private_key_pem.expose_secret().to_owned(),
        )
    }
}

impl fmt::Debug for PemMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PemMaterial")
            .field("certificate_pem", &self.certificate_pem)
            .field("private_key_pem", &"[REDACTED]")
            .finish()
    }
}

/// Human-readable facts about the end-entity certificate of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescription {
    /// Issuer distinguished name
    pub issuer: String,
    /// Subject distinguished name
    pub subject: String,
    /// Subject common name, if present
    pub common_name: Option<String>,
    /// Start of the validity window
    pub valid_from: DateTime<Utc>,
    /// End of the validity window
    pub valid_to: DateTime<Utc>,
    /// Tax ID recovered from the common name
    pub tax_id: Option<String>,
}

/// Open `pfx` with `passphrase` and return the end-entity certificate and
/// its private key as PEM.
///
/// Both the PBES2 (AES + SHA-256 MAC) and the legacy PBES1 (3DES/RC2 + SHA-1
/// MAC) protections are accepted. The shrouded key bag is preferred; a plain
/// key bag is used only when no shrouded one exists.
///
/// # Errors
///
/// - [`CertificateError::Malformed`] if the container cannot be decoded
/// - [`CertificateError::InvalidPassphrase`] if the passphrase is wrong
/// - [`CertificateError::CertificateNotFound`] / [`CertificateError::KeyNotFound`]
///   if the corresponding bag is missing
pub fn parse_bundle(pfx: &[u8], passphrase: &str) -> Result<PemMaterial, CertificateError> {
    let contents = open(pfx, passphrase)?;
    let end_entity = select_end_entity(&contents.certificates)?;
    let key = contents.key.ok_or(CertificateError::KeyNotFound)?;

    let certificate_pem = pem::encode(&Pem::new("CERTIFICATE", end_entity.to_vec()));
    let private_key_pem = Zeroizing::new(pem::encode(&Pem::new("PRIVATE KEY", key.to_vec())));

    Ok(PemMaterial {
        certificate_pem,
        private_key_pem: SecretString::from(private_key_pem.as_str().to_owned()),
    })
}

/// Describe the end-entity certificate of `pfx`.
///
/// # Errors
///
/// Same as [`parse_bundle`], except that a missing key is not an error.
pub fn describe_bundle(
    pfx: &[u8],
    passphrase: &str,
) -> Result<BundleDescription, CertificateError> {
    let contents = open(pfx, passphrase)?;
    let der = select_end_entity(&contents.certificates)?;

    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| CertificateError::Malformed(format!("Failed to parse certificate: {e}")))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);
    let tax_id = common_name.as_deref().and_then(tax_id_from_common_name);

    Ok(BundleDescription {
        issuer: cert.issuer().to_string(),
        subject: cert.subject().to_string(),
        common_name,
        valid_from: to_utc(cert.validity().not_before.timestamp())?,
        valid_to: to_utc(cert.validity().not_after.timestamp())?,
        tax_id,
    })
}

/// Certificates (DER) and private key (PKCS#8 DER) recovered from a bundle.
#[derive(Default)]
struct BundleContents {
    certificates: Vec<Vec<u8>>,
    key: Option<Zeroizing<Vec<u8>>>,
}

fn open(pfx: &[u8], passphrase: &str) -> Result<BundleContents, CertificateError> {
    let keystore = KeyStore::from_pkcs12(pfx, passphrase).map_err(classify)?;

    if let Some((_, chain)) = keystore.private_key_chain() {
        return Ok(BundleContents {
            certificates: chain.chain().iter().map(|c| c.as_der().to_vec()).collect(),
            key: Some(Zeroizing::new(chain.key().to_vec())),
        });
    }

    // The keystore only pairs shrouded keys with their certificates; plain
    // key bags and unpaired certificate bags live in the unencrypted safes.
    let mut contents = unencrypted_bags(pfx)?;
    contents.certificates.extend(keystore.entries().filter_map(|(_, entry)| match entry {
        KeyStoreEntry::Certificate(cert) => Some(cert.as_der().to_vec()),
        _ => None,
    }));
    Ok(contents)
}

fn classify(error: KeyStoreError) -> CertificateError {
    match error {
        KeyStoreError::MacError(_) | KeyStoreError::UnpadError | KeyStoreError::Pkcs5Error(_) => {
            CertificateError::InvalidPassphrase
        }
        other => CertificateError::Malformed(format!("Failed to decode PKCS#12: {other}")),
    }
}

/// Plain key bags and certificate bags from the `data` safes of `pfx`.
fn unencrypted_bags(pfx: &[u8]) -> Result<BundleContents, CertificateError> {
    let container = Pfx::from_der(pfx).map_err(malformed)?;
    let auth_safe = data_content(&container.auth_safe.content)?;
    let safes = AuthenticatedSafe::from_der(auth_safe.as_bytes()).map_err(malformed)?;

    let mut contents = BundleContents::default();
    for safe in safes.iter().filter(|safe| safe.content_type == DATA_CONTENT_OID) {
        let safe_contents = data_content(&safe.content)?;
        let bags = SafeContents::from_der(safe_contents.as_bytes()).map_err(malformed)?;
        for bag in bags {
            if bag.bag_id == pkcs12::PKCS_12_KEY_BAG_OID && contents.key.is_none() {
                let wrapped = AnyRef::from_der(&bag.bag_value).map_err(malformed)?;
                contents.key = Some(Zeroizing::new(wrapped.value().to_vec()));
            } else if bag.bag_id == pkcs12::PKCS_12_CERT_BAG_OID {
                let cert_bag =
                    ContextSpecific::<CertBag>::from_der(&bag.bag_value).map_err(malformed)?;
                contents.certificates.push(cert_bag.value.cert_value.as_bytes().to_vec());
            }
        }
    }
    Ok(contents)
}

fn data_content(content: &Any) -> Result<OctetString, CertificateError> {
    let encoded = content.to_der().map_err(malformed)?;
    OctetString::from_der(&encoded).map_err(malformed)
}

fn malformed(error: der::Error) -> CertificateError {
    CertificateError::Malformed(format!("Failed to decode PKCS#12: {error}"))
}

/// Pick the end-entity certificate: not a CA, and not the issuer of another
/// certificate in the bundle. Falls back to the first non-CA, then the first.
fn select_end_entity(certificates: &[Vec<u8>]) -> Result<&[u8], CertificateError> {
    let parsed: Vec<(&[u8], X509Certificate<'_>)> = certificates
        .iter()
        .filter_map(|der| {
            X509Certificate::from_der(der)
                .ok()
                .map(|(_, cert)| (der.as_slice(), cert))
        })
        .collect();

    if parsed.is_empty() {
        return match certificates.first() {
            Some(_) => Err(CertificateError::Malformed(
                "no decodable certificate in bundle".to_string(),
            )),
            None => Err(CertificateError::CertificateNotFound),
        };
    }

    let issues_another = |index: usize, cert: &X509Certificate<'_>| {
        parsed.iter().enumerate().any(|(other_index, (_, other))| {
            other_index != index && other.issuer().as_raw() == cert.subject().as_raw()
        })
    };

    parsed
        .iter()
        .enumerate()
        .find(|(index, (_, cert))| !cert.is_ca() && !issues_another(*index, cert))
        .or_else(|| parsed.iter().enumerate().find(|(_, (_, cert))| !cert.is_ca()))
        .or_else(|| parsed.iter().enumerate().next())
        .map(|(_, (der, _))| *der)
        .ok_or(CertificateError::CertificateNotFound)
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>, CertificateError> {
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        CertificateError::Malformed(format!("validity timestamp out of range: {timestamp}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{COMPANY_CNPJ, CertificateFixture};

    #[test]
    fn test_parse_bundle_returns_pem_pair() {
        let fixture = CertificateFixture::self_signed("ACME LTDA", COMPANY_CNPJ, "SP", "secret");
        let material = parse_bundle(&fixture.pfx, "secret").unwrap();

        assert!(material.certificate_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(material.private_key_pem.expose_secret().contains("BEGIN PRIVATE KEY"));

        let decoded = pem::parse(&material.certificate_pem).unwrap();
        assert_eq!(decoded.contents(), fixture.certificate_der.as_slice());
    }

    #[test]
    fn test_wrong_passphrase_is_rejected() {
        let fixture = CertificateFixture::self_signed("ACME LTDA", COMPANY_CNPJ, "SP", "secret");
        assert_eq!(
            parse_bundle(&fixture.pfx, "wrong").unwrap_err(),
            CertificateError::InvalidPassphrase
        );
        assert_eq!(
            describe_bundle(&fixture.pfx, "wrong").unwrap_err(),
            CertificateError::InvalidPassphrase
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = parse_bundle(b"definitely not pkcs12", "secret");
        assert!(matches!(result, Err(CertificateError::Malformed(_))));
    }

    #[test]
    fn test_end_entity_selected_over_issuer() {
        let fixture = CertificateFixture::with_issuer("ACME LTDA", COMPANY_CNPJ, "MG", "pw");
        let material = parse_bundle(&fixture.pfx, "pw").unwrap();
        let decoded = pem::parse(&material.certificate_pem).unwrap();
        assert_eq!(decoded.contents(), fixture.certificate_der.as_slice());
    }

    #[test]
    fn test_modern_bundle_with_sha256_mac_opens() {
        let fixture = CertificateFixture::self_signed("ACME LTDA", COMPANY_CNPJ, "SP", "secret");
        let mac = Pfx::from_der(&fixture.pfx).unwrap().mac_data.unwrap();
        assert_eq!(mac.mac.algorithm.oid, ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"));

        let material = parse_bundle(&fixture.pfx, "secret").unwrap();
        let decoded = pem::parse(material.private_key_pem.expose_secret()).unwrap();
        assert_eq!(decoded.contents(), fixture.key_der.as_slice());
    }

    #[test]
    fn test_legacy_bundle_opens() {
        let fixture = CertificateFixture::legacy("ACME LTDA", COMPANY_CNPJ, "SP", "secret");
        let material = parse_bundle(&fixture.pfx, "secret").unwrap();
        let decoded = pem::parse(&material.certificate_pem).unwrap();
        assert_eq!(decoded.contents(), fixture.certificate_der.as_slice());
        assert_eq!(
            parse_bundle(&fixture.pfx, "wrong").unwrap_err(),
            CertificateError::InvalidPassphrase
        );
    }

    #[test]
    fn test_plain_key_bag_is_used_without_shrouded_key() {
        let fixture = CertificateFixture::unshrouded("ACME LTDA", COMPANY_CNPJ, "SP");
        let material = parse_bundle(&fixture.pfx, "anything").unwrap();

        let key = pem::parse(material.private_key_pem.expose_secret()).unwrap();
        assert_eq!(key.contents(), fixture.key_der.as_slice());
        let cert = pem::parse(&material.certificate_pem).unwrap();
        assert_eq!(cert.contents(), fixture.certificate_der.as_slice());
    }

    #[test]
    fn test_certificate_only_bundle_has_no_key() {
        let fixture = CertificateFixture::self_signed("ACME LTDA", COMPANY_CNPJ, "SP", "pw");
        let mut keystore = KeyStore::new();
        let certificate = p12_keystore::Certificate::from_der(&fixture.certificate_der).unwrap();
        keystore.add_entry("cert", KeyStoreEntry::Certificate(certificate));
        let pfx = keystore.writer("pw").write().unwrap();

        assert_eq!(parse_bundle(&pfx, "pw").unwrap_err(), CertificateError::KeyNotFound);
        let description = describe_bundle(&pfx, "pw").unwrap();
        assert_eq!(description.tax_id.as_deref(), Some(COMPANY_CNPJ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let fixture = CertificateFixture::self_signed("ACME LTDA", COMPANY_CNPJ, "SP", "secret");
        let material = parse_bundle(&fixture.pfx, "secret").unwrap();
        assert!(!format!("{material:?}").contains("PRIVATE KEY-----"));
    }
}
