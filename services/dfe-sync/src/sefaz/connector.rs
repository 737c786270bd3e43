//! Seams between the orchestrator and the distribution service.

use async_trait::async_trait;
use rust_common::HttpConfig;

use super::Environment;
use super::client::{SefazClient, SefazClientConfig, SefazEndpoints};
use super::error::SefazError;
use super::nsu::Nsu;
use super::response::BatchResult;
use crate::certificate::PemMaterial;

/// Anything that can answer "documents since this cursor".
#[async_trait]
pub trait DistributionClient: Send + Sync {
    /// Fetch the batch of documents distributed after `cursor`.
    async fn fetch_new_documents(&self, cursor: Nsu) -> Result<BatchResult, SefazError>;
}

#[async_trait]
impl DistributionClient for SefazClient {
    async fn fetch_new_documents(&self, cursor: Nsu) -> Result<BatchResult, SefazError> {
        SefazClient::fetch_new_documents(self, cursor).await
    }
}

/// Inputs for opening a client on behalf of one company.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    /// PEM pair extracted from the company bundle
    pub material: &'a PemMaterial,
    /// Company tax ID, digits only
    pub tax_id: &'a str,
    /// Environment declared on the bundle
    pub environment: Environment,
    /// Two-digit jurisdiction code
    pub jurisdiction_code: &'a str,
}

/// Opens distribution clients.
pub trait SefazConnector: Send + Sync {
    /// Open a client for one sync run.
    ///
    /// # Errors
    ///
    /// Returns [`SefazError::Setup`] if the client cannot be configured.
    fn connect(
        &self,
        request: &ConnectRequest<'_>,
    ) -> Result<Box<dyn DistributionClient>, SefazError>;
}

/// Connector producing real mutual-TLS [`SefazClient`]s.
#[derive(Debug, Clone)]
pub struct HttpSefazConnector {
    endpoints: SefazEndpoints,
    http: HttpConfig,
}

impl HttpSefazConnector {
    /// Create a connector for `endpoints` using `http` settings.
    #[must_use]
    pub fn new(endpoints: SefazEndpoints, http: HttpConfig) -> Self {
        Self { endpoints, http }
    }
}

impl SefazConnector for HttpSefazConnector {
    fn connect(
        &self,
        request: &ConnectRequest<'_>,
    ) -> Result<Box<dyn DistributionClient>, SefazError> {
        let config = SefazClientConfig {
            environment: request.environment,
            tax_id: request.tax_id.to_string(),
            jurisdiction_code: request.jurisdiction_code.to_string(),
            endpoint: self.endpoints.for_environment(request.environment).clone(),
            http: self.http.clone(),
        };
        Ok(Box::new(SefazClient::new(request.material, config)?))
    }
}
