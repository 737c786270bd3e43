//! PKCS#12 certificate bundle handling.
//!
//! Opens the company's e-CNPJ bundle into the PEM pair used for mutual TLS
//! and into descriptive metadata shown when a certificate is uploaded.

mod error;
mod extractor;
mod subject;

pub use error::CertificateError;
pub use extractor::{BundleDescription, PemMaterial, describe_bundle, parse_bundle};
pub use subject::{code_for_state, jurisdiction_code, tax_id_from_common_name};
