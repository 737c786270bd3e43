//! Type-Safe Configuration with Validation
//!
//! Environment variables (optionally from a `.env` file) parsed into a
//! validated [`Config`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use rust_common::HttpConfig;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::sefaz::{HOMOLOGATION_URL, PRODUCTION_URL, SefazEndpoints};
use crate::sync::OrchestratorSettings;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Variable name
        field: String,
        /// Parser message
        reason: String,
    },

    /// Value parsed but out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Variable name
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },

    /// A referenced file could not be read
    #[error("Cannot read {field} at {path}: {reason}")]
    UnreadableFile {
        /// Variable name
        field: String,
        /// File path
        path: String,
        /// I/O message
        reason: String,
    },
}

/// Service configuration with validation.
#[derive(Debug)]
pub struct Config {
    /// Master key sealing stored passphrases and tokens
    pub credential_master_key: SecretString,
    /// Production distribution endpoint
    pub sefaz_production_url: Url,
    /// Homologation distribution endpoint
    pub sefaz_homologation_url: Url,
    /// Jurisdiction used when the certificate subject names no state
    pub default_jurisdiction: String,
    /// Per-request deadline in seconds
    pub request_timeout_secs: u64,
    /// Connect deadline in seconds
    pub connect_timeout_secs: u64,
    /// PEM file with extra trust roots
    pub ca_bundle: Option<PathBuf>,
    /// Skip server certificate verification
    pub accept_invalid_certs: bool,
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,
    /// Distribution calls per company per run
    pub max_iterations: u32,
    /// Seconds SEFAZ-direct is paused after a 656
    pub rate_limit_cooldown_secs: u64,
    /// Seconds after which a `running` attempt is considered abandoned
    pub stale_attempt_after_secs: u64,
    /// JSON roster seeding the in-memory store
    pub roster_file: Option<PathBuf>,
    /// Default log filter
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing, unparsable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing, unparsable or out-of-range values.
    pub fn from_source<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let master_key = get("CREDENTIAL_MASTER_KEY")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("CREDENTIAL_MASTER_KEY".to_string()))?;

        let config = Self {
            credential_master_key: SecretString::from(master_key),
            sefaz_production_url: parse_url_env(&get, "SEFAZ_PRODUCTION_URL", PRODUCTION_URL)?,
            sefaz_homologation_url: parse_url_env(
                &get,
                "SEFAZ_HOMOLOGATION_URL",
                HOMOLOGATION_URL,
            )?,
            default_jurisdiction: get("SEFAZ_DEFAULT_UF").unwrap_or_else(|| "35".to_string()),
            request_timeout_secs: parse_env(&get, "SEFAZ_REQUEST_TIMEOUT", 30)?,
            connect_timeout_secs: parse_env(&get, "SEFAZ_CONNECT_TIMEOUT", 10)?,
            ca_bundle: get("SEFAZ_CA_BUNDLE").filter(|path| !path.is_empty()).map(PathBuf::from),
            accept_invalid_certs: parse_env(&get, "SEFAZ_ACCEPT_INVALID_CERTS", false)?,
            tick_interval_secs: parse_env(&get, "SYNC_TICK_INTERVAL", 60)?,
            max_iterations: parse_env(&get, "SYNC_MAX_ITERATIONS", 50)?,
            rate_limit_cooldown_secs: parse_env(&get, "SYNC_RATE_LIMIT_COOLDOWN", 3600)?,
            stale_attempt_after_secs: parse_env(&get, "SYNC_STALE_ATTEMPT_AFTER", 1800)?,
            roster_file: get("SYNC_ROSTER_FILE").filter(|path| !path.is_empty()).map(PathBuf::from),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parse_env(&get, "LOG_JSON", false)?,
            shutdown_timeout_seconds: parse_env(&get, "SHUTDOWN_TIMEOUT", 30)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.credential_master_key.expose_secret().len() < 16 {
            return Err(invalid("CREDENTIAL_MASTER_KEY", "must be at least 16 characters"));
        }
        let uf = &self.default_jurisdiction;
        if uf.len() != 2 || !uf.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("SEFAZ_DEFAULT_UF", "must be a two-digit IBGE code"));
        }
        for (field, url) in [
            ("SEFAZ_PRODUCTION_URL", &self.sefaz_production_url),
            ("SEFAZ_HOMOLOGATION_URL", &self.sefaz_homologation_url),
        ] {
            if !matches!(url.scheme(), "https" | "http") {
                return Err(ConfigError::InvalidUrl {
                    field: field.to_string(),
                    reason: format!("unsupported scheme {}", url.scheme()),
                });
            }
        }
        let positive = [
            ("SEFAZ_REQUEST_TIMEOUT", self.request_timeout_secs),
            ("SEFAZ_CONNECT_TIMEOUT", self.connect_timeout_secs),
            ("SYNC_TICK_INTERVAL", self.tick_interval_secs),
            ("SYNC_MAX_ITERATIONS", u64::from(self.max_iterations)),
            ("SYNC_STALE_ATTEMPT_AFTER", self.stale_attempt_after_secs),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(field, "must be greater than 0"));
        }
        Ok(())
    }

    /// Endpoints per environment.
    #[must_use]
    pub fn endpoints(&self) -> SefazEndpoints {
        SefazEndpoints {
            production: self.sefaz_production_url.clone(),
            homologation: self.sefaz_homologation_url.clone(),
        }
    }

    /// HTTP settings for SEFAZ clients, loading the extra trust roots if configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnreadableFile`] if the CA bundle cannot be read.
    pub fn http_config(&self) -> Result<HttpConfig, ConfigError> {
        let mut http = HttpConfig::default()
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_user_agent(concat!("dfe-sync-service/", env!("CARGO_PKG_VERSION")))
            .with_accept_invalid_certs(self.accept_invalid_certs);

        if let Some(path) = &self.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| ConfigError::UnreadableFile {
                field: "SEFAZ_CA_BUNDLE".to_string(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            http = http.with_root_certificates(pem);
        }
        Ok(http)
    }

    /// Orchestrator tuning derived from this config.
    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_iterations: self.max_iterations,
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            stale_attempt_after: Duration::from_secs(self.stale_attempt_after_secs),
            default_jurisdiction: self.default_jurisdiction.clone(),
        }
    }

    /// Scheduler tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T, F>(get: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a URL environment variable with a default value.
fn parse_url_env<F>(get: &F, name: &str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let url_str = get(name).unwrap_or_else(|| default.to_string());
    Url::parse(&url_str).map_err(|e| ConfigError::InvalidUrl {
        field: name.to_string(),
        reason: e.to_string(),
    })
}
