//! `retDistDFeInt` parsing and status interpretation.

use std::time::Duration;
use tracing::warn;

use super::document::{RawSefazDocument, decode_doc_zip};
use super::error::SefazError;
use super::nsu::Nsu;
use super::xml::XmlNode;

/// No documents available for the query.
pub const STATUS_NO_DOCUMENTS: u16 = 137;
/// One or more documents follow.
pub const STATUS_DOCUMENTS_FOUND: u16 = 138;
/// Query-rate policy exceeded.
pub const STATUS_RATE_LIMITED: u16 = 656;
/// How long SEFAZ expects callers to stay away after a 656.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// A `docZip` element as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocZip {
    /// `NSU` attribute
    pub nsu: String,
    /// `schema` attribute
    pub schema: String,
    /// base64(gzip(xml)) text
    pub content: String,
}

/// Fields of a `retDistDFeInt` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionResponse {
    /// `cStat`
    pub status: u16,
    /// `xMotivo`
    pub reason: String,
    /// `ultNSU`: last NSU covered by this answer
    pub last_nsu: Nsu,
    /// `maxNSU`: highest NSU currently available
    pub max_nsu: Nsu,
    /// Compressed documents, in server order
    pub doc_zips: Vec<DocZip>,
}

/// Outcome of a request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// `cStat` 137
    Empty,
    /// `cStat` 138
    Documents,
}

/// A `docZip` that could not be decoded and was left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    /// `NSU` attribute as sent
    pub nsu: String,
    /// `schema` attribute
    pub schema: String,
    /// Why it was skipped
    pub reason: String,
}

/// Decoded result of one distribution call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Empty or documents
    pub status: BatchStatus,
    /// `xMotivo`
    pub reason: String,
    /// `ultNSU`
    pub last_nsu: Nsu,
    /// `maxNSU`
    pub max_nsu: Nsu,
    /// Decoded documents, in server order
    pub documents: Vec<RawSefazDocument>,
    /// Entries dropped because their payload was corrupt
    pub skipped: Vec<SkippedDocument>,
}

impl BatchResult {
    /// `cStat` was 137.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status == BatchStatus::Empty
    }

    /// The server holds documents beyond this batch.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.last_nsu < self.max_nsu
    }
}

impl DistributionResponse {
    /// Extract the response fields from a SOAP envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SefazError::Fault`] for a SOAP fault and
    /// [`SefazError::InvalidResponse`] when the body is not XML or lacks
    /// `retDistDFeInt/cStat`.
    pub fn parse(envelope: &str) -> Result<Self, SefazError> {
        let root =
            XmlNode::parse(envelope).map_err(|e| SefazError::InvalidResponse(e.to_string()))?;

        let Some(ret) = root.find("retDistDFeInt") else {
            return Err(match root.find("Fault") {
                Some(fault) => SefazError::Fault(fault_reason(fault)),
                None => SefazError::InvalidResponse("missing retDistDFeInt".to_string()),
            });
        };

        let status = ret
            .text_at(&["cStat"])
            .ok_or_else(|| SefazError::InvalidResponse("missing cStat".to_string()))?
            .parse::<u16>()
            .map_err(|e| SefazError::InvalidResponse(format!("cStat is not numeric: {e}")))?;

        let doc_zips = ret
            .child("loteDistDFeInt")
            .map(|lote| {
                lote.children_named("docZip")
                    .map(|doc| DocZip {
                        nsu: doc.attribute("NSU").unwrap_or_default().to_string(),
                        schema: doc.attribute("schema").unwrap_or_default().to_string(),
                        content: doc.text.trim().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            status,
            reason: ret.text_at(&["xMotivo"]).unwrap_or_default().to_string(),
            last_nsu: cursor(ret, "ultNSU")?,
            max_nsu: cursor(ret, "maxNSU")?,
            doc_zips,
        })
    }

    /// Apply the status contract and decode the documents.
    ///
    /// Individual documents whose payload cannot be decoded are logged and
    /// reported in [`BatchResult::skipped`].
    ///
    /// # Errors
    ///
    /// [`SefazError::RateLimited`] for 656, [`SefazError::Protocol`] for any
    /// status other than 137 and 138.
    pub fn into_batch(self) -> Result<BatchResult, SefazError> {
        let status = match self.status {
            STATUS_NO_DOCUMENTS => BatchStatus::Empty,
            STATUS_DOCUMENTS_FOUND => BatchStatus::Documents,
            STATUS_RATE_LIMITED => {
                return Err(SefazError::RateLimited {
                    message: self.reason,
                    retry_after: RATE_LIMIT_COOLDOWN,
                });
            }
            code => {
                return Err(SefazError::Protocol {
                    code,
                    message: self.reason,
                });
            }
        };

        let mut documents = Vec::new();
        let mut skipped = Vec::new();
        if status == BatchStatus::Documents {
            for doc in self.doc_zips {
                match decode_entry(&doc) {
                    Ok(document) => documents.push(document),
                    Err(reason) => {
                        warn!(
                            nsu = %doc.nsu,
                            schema = %doc.schema,
                            reason = %reason,
                            "Skipping undecodable document"
                        );
                        skipped.push(SkippedDocument {
                            nsu: doc.nsu,
                            schema: doc.schema,
                            reason,
                        });
                    }
                }
            }
        }

        Ok(BatchResult {
            status,
            reason: self.reason,
            last_nsu: self.last_nsu,
            max_nsu: self.max_nsu,
            documents,
            skipped,
        })
    }
}

fn decode_entry(doc: &DocZip) -> Result<RawSefazDocument, String> {
    let nsu: Nsu = doc.nsu.parse().map_err(|e: super::nsu::NsuError| e.to_string())?;
    let xml = decode_doc_zip(&doc.content).map_err(|e| e.to_string())?;
    Ok(RawSefazDocument::from_xml(nsu, &doc.schema, xml))
}

fn cursor(ret: &XmlNode, name: &str) -> Result<Nsu, SefazError> {
    ret.text_at(&[name])
        .map_or(Ok(Nsu::ZERO), str::parse::<Nsu>)
        .map_err(|e| SefazError::InvalidResponse(format!("{name}: {e}")))
}

fn fault_reason(fault: &XmlNode) -> String {
    fault
        .find("Text")
        .or_else(|| fault.find("faultstring"))
        .and_then(XmlNode::text)
        .unwrap_or("unspecified")
        .to_string()
}
