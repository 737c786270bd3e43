//! Mutual-TLS client for the `NFeDistribuicaoDFe` web service.

use reqwest::header::CONTENT_TYPE;
use rust_common::{HttpConfig, build_mtls_client};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::Environment;
use super::access_key::AccessKey;
use super::envelope::{DistQuery, RequestHeader, build_envelope};
use super::error::SefazError;
use super::nsu::Nsu;
use super::response::{BatchResult, DistributionResponse};
use crate::certificate::PemMaterial;

/// Official production endpoint.
pub const PRODUCTION_URL: &str = "https://www1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx";
/// Official homologation endpoint.
pub const HOMOLOGATION_URL: &str = "https://hom1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx";

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Endpoint per environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SefazEndpoints {
    /// `tpAmb=1`
    pub production: Url,
    /// `tpAmb=2`
    pub homologation: Url,
}

impl SefazEndpoints {
    /// Endpoint for `environment`.
    #[must_use]
    pub fn for_environment(&self, environment: Environment) -> &Url {
        match environment {
            Environment::Production => &self.production,
            Environment::Homologation => &self.homologation,
        }
    }

    /// The official SEFAZ endpoints.
    ///
    /// # Errors
    ///
    /// Never in practice; the constants are valid URLs.
    pub fn official() -> Result<Self, url::ParseError> {
        Ok(Self {
            production: Url::parse(PRODUCTION_URL)?,
            homologation: Url::parse(HOMOLOGATION_URL)?,
        })
    }
}

/// Who is asking, and where.
#[derive(Debug, Clone)]
pub struct SefazClientConfig {
    /// Environment (`tpAmb`)
    pub environment: Environment,
    /// Interested party's tax ID, digits only
    pub tax_id: String,
    /// Two-digit jurisdiction code (`cUF` / `cUFAutor`)
    pub jurisdiction_code: String,
    /// Service URL
    pub endpoint: Url,
    /// Timeouts, trust roots and pool settings
    pub http: HttpConfig,
}

/// Stateless distribution client authenticated with the company certificate.
///
/// Each call is independent; the caller owns the cursor.
#[derive(Debug, Clone)]
pub struct SefazClient {
    http: reqwest::Client,
    config: SefazClientConfig,
}

impl SefazClient {
    /// Build a client presenting `material` during the TLS handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SefazError::Setup`] if the PEM pair or trust roots cannot be loaded.
    pub fn new(material: &PemMaterial, config: SefazClientConfig) -> Result<Self, SefazError> {
        let http = build_mtls_client(&config.http, &material.to_identity())
            .map_err(SefazError::Setup)?;
        Ok(Self { http, config })
    }

    /// Documents distributed after `cursor` (`distNSU`).
    ///
    /// # Errors
    ///
    /// See [`SefazError`]; a 137 answer is not an error.
    #[instrument(skip(self), fields(cursor = %cursor, environment = ?self.config.environment))]
    pub async fn fetch_new_documents(&self, cursor: Nsu) -> Result<BatchResult, SefazError> {
        self.distribute(&DistQuery::Since(cursor)).await
    }

    /// The single document stored under `nsu` (`consNSU`).
    ///
    /// # Errors
    ///
    /// See [`SefazError`].
    #[instrument(skip(self), fields(nsu = %nsu))]
    pub async fn fetch_by_nsu(&self, nsu: Nsu) -> Result<BatchResult, SefazError> {
        self.distribute(&DistQuery::Nsu(nsu)).await
    }

    /// The document identified by `key` (`consChNFe`).
    ///
    /// # Errors
    ///
    /// See [`SefazError`].
    #[instrument(skip(self), fields(access_key = %key))]
    pub async fn fetch_by_access_key(&self, key: &AccessKey) -> Result<BatchResult, SefazError> {
        self.distribute(&DistQuery::AccessKey(key.clone())).await
    }

    async fn distribute(&self, query: &DistQuery) -> Result<BatchResult, SefazError> {
        let header = RequestHeader {
            environment: self.config.environment,
            jurisdiction_code: &self.config.jurisdiction_code,
            tax_id: &self.config.tax_id,
        };
        let body = build_envelope(&header, query);

        let response = self
            .http
            .post(self.config.endpoint.clone())
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(http_status = status.as_u16(), bytes = text.len(), "SEFAZ response received");

        let parsed = match DistributionResponse::parse(&text) {
            Ok(parsed) => parsed,
            Err(SefazError::Fault(reason)) => {
                warn!(
                    http_status = status.as_u16(),
                    reason = %reason,
                    "SEFAZ answered with a SOAP fault"
                );
                return Err(SefazError::Fault(reason));
            }
            Err(_) if !status.is_success() => {
                return Err(SefazError::HttpStatus {
                    status: status.as_u16(),
                });
            }
            Err(e) => return Err(e),
        };

        info!(
            c_stat = parsed.status,
            ult_nsu = %parsed.last_nsu,
            max_nsu = %parsed.max_nsu,
            documents = parsed.doc_zips.len(),
            "SEFAZ distribution answered"
        );
        parsed.into_batch()
    }
}
