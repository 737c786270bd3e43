//! NSU distribution cursor.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum NSU representable in the 15-digit wire format.
pub const MAX_NSU: u64 = 999_999_999_999_999;

/// Sequential cursor SEFAZ uses to distribute documents.
///
/// Ordered numerically; rendered as 15 zero-padded digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nsu(u64);

/// Error parsing an NSU.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid NSU '{0}': expected up to 15 decimal digits")]
pub struct NsuError(pub String);

impl Nsu {
    /// The starting cursor.
    pub const ZERO: Self = Self(0);

    /// Create an NSU from a number.
    ///
    /// # Errors
    ///
    /// Returns [`NsuError`] if `value` needs more than 15 digits.
    pub fn new(value: u64) -> Result<Self, NsuError> {
        if value > MAX_NSU {
            return Err(NsuError(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// 15-digit zero-padded wire form.
    #[must_use]
    pub fn to_wire(self) -> String {
        format!("{:015}", self.0)
    }
}

impl FromStr for Nsu {
    type Err = NsuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::ZERO);
        }
        if trimmed.len() > 15 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NsuError(s.to_string()));
        }
        trimmed.parse::<u64>().map(Self).map_err(|_| NsuError(s.to_string()))
    }
}

impl fmt::Display for Nsu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:015}", self.0)
    }
}

impl Serialize for Nsu {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Nsu {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
