//! SEFAZ `NFeDistribuicaoDFe` protocol.
//!
//! Request envelopes, the mutual-TLS transport, response status handling and
//! the decoding of distributed documents.

mod access_key;
mod client;
mod connector;
mod document;
mod envelope;
mod error;
mod nsu;
mod response;
mod xml;

use serde::{Deserialize, Serialize};

pub use access_key::{ACCESS_KEY_LEN, AccessKey, AccessKeyError, DocumentType, normalize_tax_id};
pub use client::{HOMOLOGATION_URL, PRODUCTION_URL, SefazClient, SefazClientConfig, SefazEndpoints};
pub use connector::{ConnectRequest, DistributionClient, HttpSefazConnector, SefazConnector};
pub use document::{
    CANCELLATION_EVENT, DfeDocument, DocumentKind, EventContent, InvoiceContent, Party,
    PayloadDecodeError, RawSefazDocument, decode_doc_zip,
};
pub use envelope::{
    DATA_VERSION, DistQuery, NFE_NAMESPACE, RequestHeader, WSDL_NAMESPACE, build_envelope,
};
pub use error::SefazError;
pub use nsu::{MAX_NSU, Nsu, NsuError};
pub use response::{
    BatchResult, BatchStatus, DistributionResponse, DocZip, RATE_LIMIT_COOLDOWN,
    STATUS_DOCUMENTS_FOUND, STATUS_NO_DOCUMENTS, STATUS_RATE_LIMITED, SkippedDocument,
};
pub use xml::{XmlError, XmlNode};

/// SEFAZ environment a certificate bundle is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// `tpAmb=1`
    Production,
    /// `tpAmb=2`
    Homologation,
}

impl Environment {
    /// Wire value of `tpAmb`.
    #[must_use]
    pub const fn tp_amb(self) -> u8 {
        match self {
            Self::Production => 1,
            Self::Homologation => 2,
        }
    }
}
