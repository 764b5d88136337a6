//! Latest-known price snapshot for a symbol.
//!
//! Records are not historized: each update overwrites the previous value
//! held by whichever consumer materializes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Latest known price data for one symbol.
///
/// Only `price` is required on the wire. `change`, `change_percent` and
/// `volume` default to zero, and `timestamp` is absent when the feed does
/// not send one it can be read as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Last traded price.
    pub price: f64,
    /// Absolute change versus the previous reference price.
    #[serde(default)]
    pub change: f64,
    /// Percentage change versus the previous reference price.
    #[serde(default, alias = "changePercent")]
    pub change_percent: f64,
    /// Traded volume.
    #[serde(default)]
    pub volume: f64,
    /// Server timestamp (RFC 3339 string or epoch milliseconds on the wire).
    #[serde(default, deserialize_with = "de_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceRecord {
    /// Create a record with only a price.
    pub fn new(price: f64) -> Self {
        Self {
            price,
            change: 0.0,
            change_percent: 0.0,
            volume: 0.0,
            timestamp: None,
        }
    }

    /// Parse a record from the `data` object of a price frame.
    ///
    /// Returns `None` when the object is missing `price` or carries fields of
    /// the wrong type.
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// Check if the price moved up.
    pub fn is_up(&self) -> bool {
        self.change > 0.0
    }
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }))
}
