//! Shared test utilities for fiscal-platform Rust crates.
//!
//! This crate provides:
//! - Proptest generators for fiscal domain values (NSU, access keys, CNPJ)
//! - Fixtures: generated PKCS#12 bundles, docZip payloads, SOAP responses

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;
