//! 44-digit NF-e/CT-e access keys and tax ID helpers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of an access key.
pub const ACCESS_KEY_LEN: usize = 44;

/// Error validating an access key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid access key '{0}': expected 44 decimal digits")]
pub struct AccessKeyError(pub String);

/// Fiscal document family, derived from the model code in the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    /// NF-e (model 55) or NFC-e (model 65)
    Nfe,
    /// CT-e (model 57)
    Cte,
}

impl DocumentType {
    /// Map a two-digit model code.
    #[must_use]
    pub fn from_model(model: &str) -> Option<Self> {
        match model {
            "55" | "65" => Some(Self::Nfe),
            "57" => Some(Self::Cte),
            _ => None,
        }
    }

    /// Upper-case label (`NFE` / `CTE`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nfe => "NFE",
            Self::Cte => "CTE",
        }
    }
}

/// A validated 44-digit access key.
///
/// Layout: `cUF(2) AAMM(4) CNPJ(14) mod(2) serie(3) nNF(9) tpEmis(1) cNF(8) cDV(1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    /// Validate `raw` (surrounding whitespace is ignored).
    ///
    /// # Errors
    ///
    /// Returns [`AccessKeyError`] unless `raw` is exactly 44 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, AccessKeyError> {
        let trimmed = raw.trim();
        if trimmed.len() == ACCESS_KEY_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(AccessKeyError(raw.to_string()))
        }
    }

    /// The key digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit IBGE state code of the issuer.
    #[must_use]
    pub fn state_code(&self) -> &str {
        &self.0[0..2]
    }

    /// Emitter tax ID (positions 7–20).
    #[must_use]
    pub fn emitter_tax_id(&self) -> &str {
        &self.0[6..20]
    }

    /// Model code (positions 21–22).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.0[20..22]
    }

    /// Document family, when the model is one this service ingests.
    #[must_use]
    pub fn document_type(&self) -> Option<DocumentType> {
        DocumentType::from_model(self.model())
    }

    /// Whether the trailing digit matches the modulo-11 check digit.
    #[must_use]
    pub fn has_valid_check_digit(&self) -> bool {
        let (body, dv) = self.0.split_at(ACCESS_KEY_LEN - 1);
        dv.parse::<u32>().is_ok_and(|dv| dv == check_digit(body))
    }
}

fn check_digit(body: &str) -> u32 {
    let sum: u32 = body
        .bytes()
        .rev()
        .zip((2..=9).cycle())
        .map(|(b, weight)| u32::from(b - b'0') * weight)
        .sum();
    match sum % 11 {
        0 | 1 => 0,
        rest => 11 - rest,
    }
}

impl TryFrom<String> for AccessKey {
    type Error = AccessKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything but digits from a CNPJ/CPF (`11.222.333/0001-81` → `11222333000181`).
#[must_use]
pub fn normalize_tax_id(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}
