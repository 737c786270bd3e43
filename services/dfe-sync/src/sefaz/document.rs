//! Distributed documents: decompression and classification.
//!
//! Each `docZip` carries base64(gzip(xml)). The XML is parsed with the
//! structured parser first; when that fails the access key and emitter name
//! are pulled out of the raw text with regular expressions, so one malformed
//! record never sinks its batch.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, Utc};
use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use thiserror::Error;

use super::nsu::Nsu;
use super::xml::XmlNode;

/// Cancellation event type (`tpEvento`).
pub const CANCELLATION_EVENT: &str = "110111";

/// A `docZip` payload could not be turned back into XML.
#[derive(Error, Debug)]
pub enum PayloadDecodeError {
    /// Element text is not base64
    #[error("docZip is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not a gzip stream
    #[error("docZip is not valid gzip: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Decode the text of a `docZip` element into the XML it carries.
///
/// # Errors
///
/// Returns [`PayloadDecodeError`] if the text is not base64, is not gzip,
/// or does not decompress to UTF-8.
pub fn decode_doc_zip(content: &str) -> Result<String, PayloadDecodeError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let compressed = STANDARD.decode(compact)?;
    let mut xml = String::new();
    GzDecoder::new(compressed.as_slice()).read_to_string(&mut xml)?;
    Ok(xml)
}

/// Declared family of a distributed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// An invoice (full or summary)
    Nfe,
    /// An event on an invoice (full or summary)
    Evento,
}

impl DocumentKind {
    /// Lower-case tag (`nfe` / `evento`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nfe => "nfe",
            Self::Evento => "evento",
        }
    }
}

/// A party named on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Party {
    /// CNPJ or CPF digits
    pub tax_id: Option<String>,
    /// Legal name
    pub name: Option<String>,
}

/// Invoice data available in a full `nfeProc`/`NFe` or in a `resNFe` summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceContent {
    /// Access key
    pub access_key: String,
    /// Emitter
    pub emitter: Party,
    /// Recipient (absent in summaries)
    pub recipient: Option<Party>,
    /// Emission timestamp
    pub issued_at: Option<DateTime<Utc>>,
    /// Total value in cents (`vNF`)
    pub total_cents: Option<i64>,
}

/// Event data available in a `procEventoNFe` or a `resEvento` summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContent {
    /// Access key of the invoice the event refers to
    pub access_key: String,
    /// Event type code (`tpEvento`)
    pub event_type: String,
    /// Description (`descEvento` or `xEvento`)
    pub description: Option<String>,
    /// Tax ID of the event author
    pub author_tax_id: Option<String>,
    /// When the event happened
    pub occurred_at: Option<DateTime<Utc>>,
}

impl EventContent {
    /// Whether this event cancels the invoice.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.event_type == CANCELLATION_EVENT
    }
}

/// The shapes a distributed document can take, resolved by its root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DfeDocument {
    /// `nfeProc` or a bare `NFe`
    FullInvoice(InvoiceContent),
    /// `resNFe`
    InvoiceSummary(InvoiceContent),
    /// `procEventoNFe` or a bare `evento`
    Event(EventContent),
    /// `resEvento`
    EventSummary(EventContent),
    /// Structured parsing failed or the root is unknown; best-effort fields only
    Unrecognized {
        /// Access key found in the raw text
        access_key: Option<String>,
        /// Emitter name found in the raw text
        emitter_name: Option<String>,
    },
}

impl DfeDocument {
    /// Classify decompressed XML by its root element.
    #[must_use]
    pub fn classify(xml: &str) -> Self {
        match XmlNode::parse(xml) {
            Ok(root) => match root.name.as_str() {
                "nfeProc" => root
                    .find("infNFe")
                    .map_or_else(|| unrecognized(xml), |inf| Self::FullInvoice(full_invoice(inf))),
                "NFe" => root
                    .child("infNFe")
                    .map_or_else(|| unrecognized(xml), |inf| Self::FullInvoice(full_invoice(inf))),
                "resNFe" => Self::InvoiceSummary(invoice_summary(&root)),
                "procEventoNFe" | "evento" => root
                    .find("infEvento")
                    .map_or_else(|| unrecognized(xml), |inf| Self::Event(event(inf))),
                "resEvento" => Self::EventSummary(event(&root)),
                _ => unrecognized(xml),
            },
            Err(_) => unrecognized(xml),
        }
    }

    /// Access key, if one could be extracted.
    #[must_use]
    pub fn access_key(&self) -> Option<&str> {
        let key = match self {
            Self::FullInvoice(c) | Self::InvoiceSummary(c) => Some(c.access_key.as_str()),
            Self::Event(e) | Self::EventSummary(e) => Some(e.access_key.as_str()),
            Self::Unrecognized { access_key, .. } => access_key.as_deref(),
        };
        key.filter(|k| !k.is_empty())
    }

    /// Emitter display name (event author has none).
    #[must_use]
    pub fn emitter_name(&self) -> Option<&str> {
        match self {
            Self::FullInvoice(c) | Self::InvoiceSummary(c) => c.emitter.name.as_deref(),
            Self::Event(_) | Self::EventSummary(_) => None,
            Self::Unrecognized { emitter_name, .. } => emitter_name.as_deref(),
        }
    }

    /// Invoice content for the invoice shapes.
    #[must_use]
    pub fn invoice(&self) -> Option<&InvoiceContent> {
        match self {
            Self::FullInvoice(c) | Self::InvoiceSummary(c) => Some(c),
            _ => None,
        }
    }

    /// Event content for the event shapes.
    #[must_use]
    pub fn event(&self) -> Option<&EventContent> {
        match self {
            Self::Event(e) | Self::EventSummary(e) => Some(e),
            _ => None,
        }
    }
}

/// One decoded document of a distribution batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSefazDocument {
    /// NSU the document was distributed under
    pub nsu: Nsu,
    /// Access key (empty when none could be extracted)
    pub access_key: String,
    /// Emitter display name (empty when unknown)
    pub emitter_name: String,
    /// `nfe` or `evento`
    pub kind: DocumentKind,
    /// Schema attribute, e.g. `resNFe_v1.01`
    pub schema: String,
    /// Decompressed XML
    pub xml: String,
    /// Structured content
    pub content: DfeDocument,
}

impl RawSefazDocument {
    /// Build a document from decompressed XML.
    #[must_use]
    pub fn from_xml(nsu: Nsu, schema: &str, xml: String) -> Self {
        let content = DfeDocument::classify(&xml);
        let kind = match &content {
            DfeDocument::FullInvoice(_) | DfeDocument::InvoiceSummary(_) => DocumentKind::Nfe,
            DfeDocument::Event(_) | DfeDocument::EventSummary(_) => DocumentKind::Evento,
            DfeDocument::Unrecognized { .. } => kind_from_schema(schema),
        };
        Self {
            nsu,
            access_key: content.access_key().unwrap_or_default().to_string(),
            emitter_name: content.emitter_name().unwrap_or_default().to_string(),
            kind,
            schema: schema.to_string(),
            xml,
            content,
        }
    }
}

fn kind_from_schema(schema: &str) -> DocumentKind {
    if schema.to_ascii_lowercase().contains("evento") {
        DocumentKind::Evento
    } else {
        DocumentKind::Nfe
    }
}

fn full_invoice(inf: &XmlNode) -> InvoiceContent {
    let access_key = inf
        .attribute("Id")
        .map(|id| id.trim_start_matches("NFe").to_string())
        .unwrap_or_default();
    InvoiceContent {
        access_key,
        emitter: party(inf.child("emit")),
        recipient: inf.child("dest").map(|d| party(Some(d))),
        issued_at: inf
            .child("ide")
            .and_then(|ide| ide.text_at(&["dhEmi"]).or_else(|| ide.text_at(&["dEmi"])))
            .and_then(parse_timestamp),
        total_cents: inf
            .text_at(&["total", "ICMSTot", "vNF"])
            .and_then(parse_cents),
    }
}

fn invoice_summary(root: &XmlNode) -> InvoiceContent {
    InvoiceContent {
        access_key: root.text_at(&["chNFe"]).unwrap_or_default().to_string(),
        emitter: Party {
            tax_id: root
                .text_at(&["CNPJ"])
                .or_else(|| root.text_at(&["CPF"]))
                .map(str::to_string),
            name: root.text_at(&["xNome"]).map(str::to_string),
        },
        recipient: None,
        issued_at: root.text_at(&["dhEmi"]).and_then(parse_timestamp),
        total_cents: root.text_at(&["vNF"]).and_then(parse_cents),
    }
}

fn event(node: &XmlNode) -> EventContent {
    EventContent {
        access_key: node.text_at(&["chNFe"]).unwrap_or_default().to_string(),
        event_type: node.text_at(&["tpEvento"]).unwrap_or_default().to_string(),
        description: node
            .text_at(&["detEvento", "descEvento"])
            .or_else(|| node.text_at(&["xEvento"]))
            .map(str::to_string),
        author_tax_id: node
            .text_at(&["CNPJ"])
            .or_else(|| node.text_at(&["CPF"]))
            .map(str::to_string),
        occurred_at: node.text_at(&["dhEvento"]).and_then(parse_timestamp),
    }
}

fn party(node: Option<&XmlNode>) -> Party {
    node.map_or_else(Party::default, |n| Party {
        tax_id: n
            .text_at(&["CNPJ"])
            .or_else(|| n.text_at(&["CPF"]))
            .map(str::to_string),
        name: n.text_at(&["xNome"]).map(str::to_string),
    })
}

static ACCESS_KEY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"<chNFe>\s*(\d{44})\s*</chNFe>",
        r#"Id\s*=\s*"NFe(\d{44})""#,
        r"<chCTe>\s*(\d{44})\s*</chCTe>",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static EMITTER_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"<xNome>\s*([^<]+?)\s*</xNome>").ok());

fn unrecognized(xml: &str) -> DfeDocument {
    let access_key = ACCESS_KEY_PATTERNS
        .iter()
        .find_map(|re| re.captures(xml))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let emitter_name = EMITTER_NAME
        .as_ref()
        .and_then(|re| re.captures(xml))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    DfeDocument::Unrecognized {
        access_key,
        emitter_name,
    }
}

/// Parse `2024-01-15T10:00:00-03:00`, or a bare `2024-01-15` from older layouts.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

/// Parse a decimal amount (`1500.5`, `1500.00`) into cents. Extra decimals are truncated.
pub(crate) fn parse_cents(value: &str) -> Option<i64> {
    let (negative, digits) = match value.trim().strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.trim()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction[..2].parse().ok()?,
    };
    let total = whole.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -total } else { total })
}
