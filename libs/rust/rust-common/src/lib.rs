//! Shared library for cross-cutting concerns in fiscal-platform Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building, including mutual-TLS identities
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{ClientIdentity, HttpConfig, build_http_client, build_mtls_client};
pub use tracing_config::{TracingConfig, init_tracing};
