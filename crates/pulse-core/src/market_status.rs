//! Trading session status pushed by the feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market status as last reported by the feed.
///
/// `Unknown` is the initial value and the fallback for any status string
/// the client does not recognize. There is no local calendar fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketStatus {
    /// Regular session.
    Open,
    /// Pre-market session.
    PreMarket,
    /// Closed for the day.
    Closed,
    /// Weekend.
    Weekend,
    /// Not yet reported, or reported with an unrecognized value.
    #[default]
    Unknown,
}

impl MarketStatus {
    /// Map a wire status string to a status. Unrecognized values map to `Unknown`.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Self::Open,
            "pre-market" | "pre_market" | "premarket" => Self::PreMarket,
            "closed" => Self::Closed,
            "weekend" => Self::Weekend,
            _ => Self::Unknown,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PreMarket => "pre-market",
            Self::Closed => "closed",
            Self::Weekend => "weekend",
            Self::Unknown => "unknown",
        }
    }

    /// Check if the regular session is trading.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(MarketStatus::default(), MarketStatus::Unknown);
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(MarketStatus::from_wire("open"), MarketStatus::Open);
        assert_eq!(MarketStatus::from_wire("pre-market"), MarketStatus::PreMarket);
        assert_eq!(MarketStatus::from_wire("CLOSED"), MarketStatus::Closed);
        assert_eq!(MarketStatus::from_wire("weekend"), MarketStatus::Weekend);
        assert_eq!(MarketStatus::from_wire("halted"), MarketStatus::Unknown);
    }

    #[test]
    fn test_display_round_trips_wire_name() {
        for status in [
            MarketStatus::Open,
            MarketStatus::PreMarket,
            MarketStatus::Closed,
            MarketStatus::Weekend,
        ] {
            assert_eq!(MarketStatus::from_wire(&status.to_string()), status);
        }
    }
}
