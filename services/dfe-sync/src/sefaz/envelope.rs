//! SOAP 1.2 request envelopes for `NFeDistribuicaoDFe`.

use quick_xml::escape::escape;

use super::Environment;
use super::access_key::AccessKey;
use super::nsu::Nsu;

/// WSDL namespace of the distribution service.
pub const WSDL_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe";
/// Namespace of the NF-e schemas.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";
/// Protocol version sent in `versaoDados` and `distDFeInt/@versao`.
pub const DATA_VERSION: &str = "1.01";

/// What a distribution request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistQuery {
    /// Everything after the given cursor (`distNSU/ultNSU`)
    Since(Nsu),
    /// The single document stored under an NSU (`consNSU/NSU`)
    Nsu(Nsu),
    /// The document identified by an access key (`consChNFe/chNFe`)
    AccessKey(AccessKey),
}

impl DistQuery {
    fn to_xml(&self) -> String {
        match self {
            Self::Since(nsu) => format!("<distNSU><ultNSU>{}</ultNSU></distNSU>", nsu.to_wire()),
            Self::Nsu(nsu) => format!("<consNSU><NSU>{}</NSU></consNSU>", nsu.to_wire()),
            Self::AccessKey(key) => format!("<consChNFe><chNFe>{key}</chNFe></consChNFe>"),
        }
    }
}

/// Parameters shared by every request of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader<'a> {
    /// Environment (`tpAmb`)
    pub environment: Environment,
    /// Two-digit jurisdiction code (`cUF` / `cUFAutor`)
    pub jurisdiction_code: &'a str,
    /// Interested party's tax ID, digits only
    pub tax_id: &'a str,
}

/// Build the full SOAP envelope for `query`.
///
/// An 11-digit tax ID is sent as `CPF`, anything else as `CNPJ`.
#[must_use]
pub fn build_envelope(header: &RequestHeader<'_>, query: &DistQuery) -> String {
    let uf = escape(header.jurisdiction_code);
    let tax_id = escape(header.tax_id);
    let tax_tag = if header.tax_id.len() == 11 { "CPF" } else { "CNPJ" };

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap12:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:soap12="http://www.w3.org/2003/05/soap-envelope">"#,
            r#"<soap12:Header><nfeCabecMsg xmlns="{wsdl}">"#,
            "<cUF>{uf}</cUF><versaoDados>{version}</versaoDados>",
            "</nfeCabecMsg></soap12:Header>",
            r#"<soap12:Body><nfeDistDFeInteresse xmlns="{wsdl}"><nfeDadosMsg>"#,
            r#"<distDFeInt xmlns="{nfe}" versao="{version}">"#,
            "<tpAmb>{tp_amb}</tpAmb><cUFAutor>{uf}</cUFAutor>",
            "<{tax_tag}>{tax_id}</{tax_tag}>{query}",
            "</distDFeInt></nfeDadosMsg></nfeDistDFeInteresse></soap12:Body></soap12:Envelope>"
        ),
        wsdl = WSDL_NAMESPACE,
        nfe = NFE_NAMESPACE,
        version = DATA_VERSION,
        uf = uf,
        tp_amb = header.environment.tp_amb(),
        tax_tag = tax_tag,
        tax_id = tax_id,
        query = query.to_xml(),
    )
}
