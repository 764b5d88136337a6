//! Instrument symbol identifiers.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Normalized ticker symbol (e.g., "ACME", "RELIANCE.NS", "^NSEI").
///
/// Symbols are compared after trimming surrounding whitespace and
/// upper-casing, so "acme " and "ACME" refer to the same instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalizing the raw identifier.
    pub fn new(raw: &str) -> Result<Self> {
        Self::normalize(raw).ok_or_else(|| CoreError::InvalidSymbol(raw.to_string()))
    }

    /// Normalize a raw identifier. Returns `None` for blank input.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_uppercase()))
    }

    /// Get the symbol as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_uppercases() {
        let sym = Symbol::new("  reliance.ns ").unwrap();
        assert_eq!(sym.as_str(), "RELIANCE.NS");
    }

    #[test]
    fn test_blank_symbol_rejected() {
        assert!(Symbol::normalize("   ").is_none());
        assert!(matches!(Symbol::new(""), Err(CoreError::InvalidSymbol(_))));
    }

    #[test]
    fn test_equal_after_normalization() {
        assert_eq!(Symbol::new("acme").unwrap(), Symbol::new("ACME").unwrap());
    }
}
