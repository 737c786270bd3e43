//! Centralized HTTP client configuration and building.
//!
//! This module provides a standardized way to create HTTP clients with
//! consistent configuration across all fiscal-platform services, including
//! clients that authenticate with a client certificate (mutual TLS).

use crate::PlatformError;
use reqwest::{Certificate, Client, ClientBuilder, Identity};
use std::fmt;
use std::time::Duration;

/// HTTP client configuration.
///
/// Provides sensible defaults for production use with connection pooling,
/// timeouts, and TLS configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// Extra PEM-encoded trust roots added on top of the built-in ones
    pub root_certificates_pem: Option<Vec<u8>>,
    /// Skip server certificate verification
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: "fiscal-platform-rust/1.0".to_string(),
            root_certificates_pem: None,
            accept_invalid_certs: false,
        }
    }
}

impl HttpConfig {
    /// Create a new HTTP config with custom timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a PEM bundle of extra trust roots.
    #[must_use]
    pub fn with_root_certificates(mut self, pem: Vec<u8>) -> Self {
        self.root_certificates_pem = Some(pem);
        self
    }

    /// Disable server certificate verification.
    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

/// PEM-encoded client certificate and private key for mutual TLS.
#[derive(Clone)]
pub struct ClientIdentity {
    certificate_pem: String,
    private_key_pem: String,
}

impl ClientIdentity {
    /// Create an identity from a PEM certificate and a PEM private key.
    #[must_use]
    pub fn from_pem(
        certificate_pem: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            certificate_pem: certificate_pem.into(),
            private_key_pem: private_key_pem.into(),
        }
    }

    fn to_reqwest(&self) -> Result<Identity, PlatformError> {
        let mut bundle = String::with_capacity(
            self.certificate_pem.len() + self.private_key_pem.len() + 1,
        );
        bundle.push_str(&self.certificate_pem);
        if !bundle.ends_with('\n') {
            bundle.push('\n');
        }
        bundle.push_str(&self.private_key_pem);

        Identity::from_pem(bundle.as_bytes())
            .map_err(|e| PlatformError::InvalidIdentity(e.to_string()))
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificate_pem", &self.certificate_pem)
            .field("private_key_pem", &"[REDACTED]")
            .finish()
    }
}

fn base_builder(config: &HttpConfig) -> Result<ClientBuilder, PlatformError> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .danger_accept_invalid_certs(config.accept_invalid_certs);

    if let Some(pem) = &config.root_certificates_pem {
        let roots = Certificate::from_pem_bundle(pem)
            .map_err(|e| PlatformError::InvalidRootCertificate(e.to_string()))?;
        for root in roots {
            builder = builder.add_root_certificate(root);
        }
    }

    Ok(builder)
}

/// Build a configured HTTP client.
///
/// Creates a reqwest client with rustls TLS, connection pooling, and
/// the specified configuration.
///
/// # Errors
///
/// Returns an error if the client cannot be built (e.g., TLS initialization fails).
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default()
///     .with_timeout(Duration::from_secs(60));
/// let client = build_http_client(&config).expect("Failed to build client");
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, PlatformError> {
    Ok(base_builder(config)?.build()?)
}

/// Build an HTTP client that presents `identity` during the TLS handshake.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidIdentity`] when the PEM pair cannot be
/// loaded, or an HTTP error if the client cannot be built.
pub fn build_mtls_client(
    config: &HttpConfig,
    identity: &ClientIdentity,
) -> Result<Client, PlatformError> {
    let identity = identity.to_reqwest()?;
    Ok(base_builder(config)?.identity(identity).build()?)
}
