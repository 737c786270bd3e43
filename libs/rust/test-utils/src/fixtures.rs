//! Test fixtures with sample fiscal data.
//!
//! Builders for the artifacts the sync core consumes: PKCS#12 bundles,
//! compressed docZip payloads, distribution documents and the SOAP
//! envelopes SEFAZ answers with.

#![allow(clippy::expect_used)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use der::asn1::OctetString;
use der::oid::ObjectIdentifier;
use der::{Any, Encode};
use flate2::Compression;
use flate2::write::GzEncoder;
use p12_keystore::{
    Certificate, EncryptionAlgorithm, KeyStore, KeyStoreEntry, MacAlgorithm, PrivateKeyChain,
};
use pkcs12::cert_type::CertBag;
use pkcs12::pfx::{Pfx, Version};
use pkcs12::safe_bag::{SafeBag, SafeContents};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use std::io::Write;

/// Tax ID used by fixtures as "our" company.
pub const COMPANY_CNPJ: &str = "11222333000181";

/// Tax ID used by fixtures as a third-party supplier.
pub const SUPPLIER_CNPJ: &str = "44555666000199";

/// PKCS#7 `data` content type.
const DATA_CONTENT_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// `x509Certificate` certificate bag type.
const X509_CERT_TYPE_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.22.1");

/// How a generated bundle protects its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// PBES2 with AES-256-CBC and an HMAC-SHA-256 MAC (current OpenSSL default)
    Modern,
    /// PBE-SHA1-3DES with an HMAC-SHA-1 MAC (`openssl pkcs12 -legacy`)
    Legacy,
}

/// A generated PKCS#12 bundle and the material it was built from.
#[derive(Debug, Clone)]
pub struct CertificateFixture {
    /// DER-encoded PFX container
    pub pfx: Vec<u8>,
    /// Passphrase protecting the container
    pub passphrase: String,
    /// DER of the end-entity certificate
    pub certificate_der: Vec<u8>,
    /// PKCS#8 DER of the private key
    pub key_der: Vec<u8>,
    /// DER of the issuing CA, when the bundle carries one
    pub ca_der: Option<Vec<u8>>,
}

impl CertificateFixture {
    /// Self-signed e-CNPJ style certificate: `CN=<legal name>:<cnpj>`, `ST=<state>`,
    /// protected the way current OpenSSL exports are.
    #[must_use]
    pub fn self_signed(legal_name: &str, cnpj: &str, state: &str, passphrase: &str) -> Self {
        Self::self_signed_with(legal_name, cnpj, state, passphrase, Protection::Modern)
    }

    /// Self-signed certificate in a legacy-protected bundle.
    #[must_use]
    pub fn legacy(legal_name: &str, cnpj: &str, state: &str, passphrase: &str) -> Self {
        Self::self_signed_with(legal_name, cnpj, state, passphrase, Protection::Legacy)
    }

    fn self_signed_with(
        legal_name: &str,
        cnpj: &str,
        state: &str,
        passphrase: &str,
        protection: Protection,
    ) -> Self {
        let params = leaf_params(legal_name, cnpj, state);
        let key = KeyPair::generate().expect("key generation");
        let cert = params.self_signed(&key).expect("self-signed certificate");

        let certificate_der = cert.der().to_vec();
        let key_der = key.serialize_der();
        let pfx = build_pfx(&certificate_der, &key_der, None, passphrase, protection);

        Self {
            pfx,
            passphrase: passphrase.to_string(),
            certificate_der,
            key_der,
            ca_der: None,
        }
    }

    /// Leaf certificate issued by a generated CA; both certificates land in the bundle.
    #[must_use]
    pub fn with_issuer(legal_name: &str, cnpj: &str, state: &str, passphrase: &str) -> Self {
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("ca params");
        let mut ca_dn = DistinguishedName::new();
        ca_dn.push(DnType::CommonName, "AC Teste Fiscal v5");
        ca_dn.push(DnType::OrganizationName, "ICP-Brasil");
        ca_dn.push(DnType::CountryName, "BR");
        ca_params.distinguished_name = ca_dn;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate().expect("ca key generation");
        let ca_cert = ca_params.self_signed(&ca_key).expect("ca certificate");

        let leaf_key = KeyPair::generate().expect("leaf key generation");
        let leaf = leaf_params(legal_name, cnpj, state)
            .signed_by(&leaf_key, &ca_cert, &ca_key)
            .expect("leaf certificate");

        let certificate_der = leaf.der().to_vec();
        let key_der = leaf_key.serialize_der();
        let ca_der = ca_cert.der().to_vec();
        let pfx =
            build_pfx(&certificate_der, &key_der, Some(&ca_der), passphrase, Protection::Modern);

        Self {
            pfx,
            passphrase: passphrase.to_string(),
            certificate_der,
            key_der,
            ca_der: Some(ca_der),
        }
    }

    /// Bundle with an unencrypted key bag and no MAC (`-keypbe NONE -certpbe NONE -nomac`).
    ///
    /// Any passphrase opens it.
    #[must_use]
    pub fn unshrouded(legal_name: &str, cnpj: &str, state: &str) -> Self {
        let params = leaf_params(legal_name, cnpj, state);
        let key = KeyPair::generate().expect("key generation");
        let cert = params.self_signed(&key).expect("self-signed certificate");

        let certificate_der = cert.der().to_vec();
        let key_der = key.serialize_der();
        let pfx = build_unshrouded_pfx(&certificate_der, &key_der);

        Self {
            pfx,
            passphrase: String::new(),
            certificate_der,
            key_der,
            ca_der: None,
        }
    }
}

fn leaf_params(legal_name: &str, cnpj: &str, state: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("leaf params");
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, format!("{legal_name}:{cnpj}"));
    dn.push(DnType::OrganizationName, "ICP-Brasil");
    dn.push(DnType::StateOrProvinceName, state);
    dn.push(DnType::LocalityName, "SAO PAULO");
    dn.push(DnType::CountryName, "BR");
    params.distinguished_name = dn;
    params
}

fn build_pfx(
    cert_der: &[u8],
    key_der: &[u8],
    ca_der: Option<&[u8]>,
    passphrase: &str,
    protection: Protection,
) -> Vec<u8> {
    let mut chain = vec![Certificate::from_der(cert_der).expect("leaf certificate")];
    if let Some(ca_der) = ca_der {
        chain.push(Certificate::from_der(ca_der).expect("ca certificate"));
    }

    let mut keystore = KeyStore::new();
    keystore.add_entry(
        "e-cnpj",
        KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(key_der, b"e-cnpj-key", chain)),
    );

    let writer = keystore.writer(passphrase).encryption_iterations(2048).mac_iterations(2048);
    let writer = match protection {
        Protection::Modern => writer
            .encryption_algorithm(EncryptionAlgorithm::PbeWithHmacSha256AndAes256)
            .mac_algorithm(MacAlgorithm::HmacSha256),
        Protection::Legacy => writer
            .encryption_algorithm(EncryptionAlgorithm::PbeWithShaAnd3KeyTripleDesCbc)
            .mac_algorithm(MacAlgorithm::HmacSha1),
    };
    writer.write().expect("pkcs12 container")
}

fn build_unshrouded_pfx(cert_der: &[u8], key_der: &[u8]) -> Vec<u8> {
    let cert_bag = CertBag {
        cert_id: X509_CERT_TYPE_OID,
        cert_value: OctetString::new(cert_der).expect("certificate octets"),
    };
    let bags: SafeContents = vec![
        SafeBag {
            bag_id: pkcs12::PKCS_12_KEY_BAG_OID,
            bag_value: key_der.to_vec(),
            bag_attributes: None,
        },
        SafeBag {
            bag_id: pkcs12::PKCS_12_CERT_BAG_OID,
            bag_value: cert_bag.to_der().expect("certificate bag"),
            bag_attributes: None,
        },
    ];

    let safe = data_content(&bags.to_der().expect("safe contents"));
    let auth_safe = vec![safe].to_der().expect("authenticated safe");
    Pfx {
        version: Version::V3,
        auth_safe: data_content(&auth_safe),
        mac_data: None,
    }
    .to_der()
    .expect("pkcs12 container")
}

fn data_content(bytes: &[u8]) -> cms::content_info::ContentInfo {
    let octets = OctetString::new(bytes).expect("content octets");
    cms::content_info::ContentInfo {
        content_type: DATA_CONTENT_OID,
        content: Any::encode_from(&octets).expect("content"),
    }
}

/// Gzip then base64 an XML document the way `docZip` elements carry it.
#[must_use]
pub fn doc_zip(xml: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes()).expect("gzip write");
    let compressed = encoder.finish().expect("gzip finish");
    STANDARD.encode(compressed)
}

/// Build a valid 44-digit access key (check digit included).
///
/// `model` is `55` for NF-e or `57` for CT-e; `number` distinguishes keys.
#[must_use]
pub fn access_key(emitter_cnpj: &str, model: &str, number: u32) -> String {
    let body = format!("352401{emitter_cnpj}{model}001{number:09}1{number:08}");
    debug_assert_eq!(body.len(), 43);
    format!("{body}{}", access_key_check_digit(&body))
}

/// Modulo-11 check digit over the first 43 digits of an access key.
#[must_use]
pub fn access_key_check_digit(first_43: &str) -> u32 {
    let mut weight = 2;
    let mut sum = 0;
    for digit in first_43.chars().rev().filter_map(|c| c.to_digit(10)) {
        sum += digit * weight;
        weight = if weight == 9 { 2 } else { weight + 1 };
    }
    let rest = sum % 11;
    if rest < 2 { 0 } else { 11 - rest }
}

/// `resNFe` summary document.
#[must_use]
pub fn res_nfe_xml(
    key: &str,
    emitter_cnpj: &str,
    emitter_name: &str,
    total: &str,
    issued_at: &str,
) -> String {
    format!(
        r#"<resNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01"><chNFe>{key}</chNFe><CNPJ>{emitter_cnpj}</CNPJ><xNome>{emitter_name}</xNome><IE>123456789</IE><dhEmi>{issued_at}</dhEmi><tpNF>1</tpNF><vNF>{total}</vNF><digVal>abc=</digVal><dhRecbto>{issued_at}</dhRecbto><nProt>135240000000001</nProt><cSitNFe>1</cSitNFe></resNFe>"#
    )
}

/// Full `nfeProc` document with emitter, recipient and totals.
#[must_use]
pub fn nfe_proc_xml(
    key: &str,
    emitter_cnpj: &str,
    emitter_name: &str,
    recipient_cnpj: &str,
    recipient_name: &str,
    total: &str,
    issued_at: &str,
) -> String {
    format!(
        r#"<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00"><NFe><infNFe Id="NFe{key}" versao="4.00"><ide><cUF>35</cUF><natOp>VENDA</natOp><mod>55</mod><serie>1</serie><nNF>1</nNF><dhEmi>{issued_at}</dhEmi><tpNF>1</tpNF></ide><emit><CNPJ>{emitter_cnpj}</CNPJ><xNome>{emitter_name}</xNome></emit><dest><CNPJ>{recipient_cnpj}</CNPJ><xNome>{recipient_name}</xNome></dest><total><ICMSTot><vProd>{total}</vProd><vNF>{total}</vNF></ICMSTot></total></infNFe></NFe><protNFe versao="4.00"><infProt><tpAmb>1</tpAmb><chNFe>{key}</chNFe><nProt>135240000000002</nProt><cStat>100</cStat></infProt></protNFe></nfeProc>"#
    )
}

/// `resEvento` summary for an event on `key`.
#[must_use]
pub fn res_evento_xml(key: &str, author_cnpj: &str, event_type: &str, description: &str) -> String {
    format!(
        r#"<resEvento xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01"><cOrgao>35</cOrgao><CNPJ>{author_cnpj}</CNPJ><chNFe>{key}</chNFe><dhEvento>2024-01-16T09:00:00-03:00</dhEvento><tpEvento>{event_type}</tpEvento><nSeqEvento>1</nSeqEvento><xEvento>{description}</xEvento><dhRecbto>2024-01-16T09:00:05-03:00</dhRecbto><nProt>135240000000003</nProt></resEvento>"#
    )
}

/// Full `procEventoNFe` document for an event on `key`.
#[must_use]
pub fn proc_evento_xml(
    key: &str,
    author_cnpj: &str,
    event_type: &str,
    description: &str,
) -> String {
    format!(
        r#"<procEventoNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.00"><evento versao="1.00"><infEvento Id="ID{event_type}{key}01"><cOrgao>35</cOrgao><tpAmb>1</tpAmb><CNPJ>{author_cnpj}</CNPJ><chNFe>{key}</chNFe><dhEvento>2024-01-16T09:00:00-03:00</dhEvento><tpEvento>{event_type}</tpEvento><nSeqEvento>1</nSeqEvento><verEvento>1.00</verEvento><detEvento versao="1.00"><descEvento>{description}</descEvento></detEvento></infEvento></evento></procEventoNFe>"#
    )
}

/// One `docZip` entry of a distribution response.
#[derive(Debug, Clone)]
pub struct DocZipFixture {
    /// NSU attribute (rendered as given)
    pub nsu: String,
    /// Schema attribute, e.g. `resNFe_v1.01`
    pub schema: String,
    /// Element text (normally base64 gzip)
    pub content: String,
}

impl DocZipFixture {
    /// Compress `xml` into a docZip entry.
    #[must_use]
    pub fn compressed(nsu: u64, schema: &str, xml: &str) -> Self {
        Self {
            nsu: format!("{nsu:015}"),
            schema: schema.to_string(),
            content: doc_zip(xml),
        }
    }

    /// Entry whose text is not valid base64/gzip.
    #[must_use]
    pub fn corrupted(nsu: u64, schema: &str) -> Self {
        Self {
            nsu: format!("{nsu:015}"),
            schema: schema.to_string(),
            content: "H4sI!!not-base64!!".to_string(),
        }
    }
}

/// SOAP 1.2 envelope as returned by `NFeDistribuicaoDFe`.
#[must_use]
pub fn dist_response(
    c_stat: u16,
    motivo: &str,
    ult_nsu: u64,
    max_nsu: u64,
    docs: &[DocZipFixture],
) -> String {
    let lote = if docs.is_empty() {
        String::new()
    } else {
        let entries: String = docs
            .iter()
            .map(|d| {
                format!(r#"<docZip NSU="{}" schema="{}">{}</docZip>"#, d.nsu, d.schema, d.content)
            })
            .collect();
        format!("<loteDistDFeInt>{entries}</loteDistDFeInt>")
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema"><soap:Body><nfeDistDFeInteresseResponse xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe"><nfeDistDFeInteresseResult><retDistDFeInt xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01"><tpAmb>1</tpAmb><verAplic>1.4.0</verAplic><cStat>{c_stat}</cStat><xMotivo>{motivo}</xMotivo><dhResp>2024-01-16T10:00:00-03:00</dhResp><ultNSU>{ult_nsu:015}</ultNSU><maxNSU>{max_nsu:015}</maxNSU>{lote}</retDistDFeInt></nfeDistDFeInteresseResult></nfeDistDFeInteresseResponse></soap:Body></soap:Envelope>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_key_has_44_digits() {
        let key = access_key(SUPPLIER_CNPJ, "55", 7);
        assert_eq!(key.len(), 44);
        assert!(key.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_access_key_embeds_emitter_and_model() {
        let key = access_key(SUPPLIER_CNPJ, "57", 1);
        assert_eq!(&key[6..20], SUPPLIER_CNPJ);
        assert_eq!(&key[20..22], "57");
    }

    #[test]
    fn test_distinct_numbers_give_distinct_keys() {
        assert_ne!(access_key(SUPPLIER_CNPJ, "55", 1), access_key(SUPPLIER_CNPJ, "55", 2));
    }

    #[test]
    fn test_dist_response_pads_cursors() {
        let xml = dist_response(137, "Nenhum documento localizado", 5, 5, &[]);
        assert!(xml.contains("<ultNSU>000000000000005</ultNSU>"));
        assert!(!xml.contains("loteDistDFeInt"));
    }
}
