//! Feed wire frames.
//!
//! Client → server frames are tagged by `action`, server → client frames
//! by `type`. Inbound frames that are not JSON, carry an unknown `type`, or
//! miss required fields are dropped: `FeedFrame::parse` returns `None` and
//! nothing is dispatched.

use crate::error::WsResult;
use pulse_core::{MarketStatus, PriceRecord, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

// ============================================================================
// Client → server
// ============================================================================

/// Outgoing control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    /// `{"action":"subscribe","symbols":[...]}`
    Subscribe { symbols: Vec<String> },
    /// `{"action":"unsubscribe","symbols":[...]}`
    Unsubscribe { symbols: Vec<String> },
    /// `{"action":"ping"}`
    Ping,
}

impl ClientFrame {
    /// Create a subscribe frame.
    pub fn subscribe<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Subscribe {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an unsubscribe frame.
    pub fn unsubscribe<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Unsubscribe {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_text(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Ping => "ping",
        }
    }
}

// ============================================================================
// Server → client
// ============================================================================

/// Envelope as it appears on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawFrame {
    PriceUpdate {
        symbol: String,
        data: Value,
    },
    MarketStatus {
        data: MarketStatusData,
    },
    InitialPrices {
        data: Map<String, Value>,
    },
    Pong,
    Subscribed {
        #[serde(default)]
        symbols: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct MarketStatusData {
    status: String,
}

/// Snapshot of prices sent after (re)subscribing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialPrices {
    /// Valid entries, ordered by symbol.
    pub prices: Vec<(Symbol, PriceRecord)>,
    /// Number of entries that failed to parse.
    pub failed_count: usize,
}

/// Recognized inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    /// Per-symbol price delta.
    PriceUpdate { symbol: Symbol, record: PriceRecord },
    /// Market status side channel.
    MarketStatus(MarketStatus),
    /// Full snapshot of subscribed prices.
    InitialPrices(InitialPrices),
    /// Heartbeat acknowledgment.
    Pong,
    /// Subscription acknowledgment.
    Subscribed { symbols: Vec<String> },
}

impl FeedFrame {
    /// Parse an inbound text frame. Returns `None` for anything that is not a
    /// recognized, well-formed frame.
    pub fn parse(text: &str) -> Option<Self> {
        let raw: RawFrame = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Dropping unrecognized frame");
                return None;
            }
        };

        match raw {
            RawFrame::PriceUpdate { symbol, data } => {
                let Some(symbol) = Symbol::normalize(&symbol) else {
                    debug!("Dropping price_update with blank symbol");
                    return None;
                };
                let Some(record) = PriceRecord::from_value(&data) else {
                    debug!(%symbol, "Dropping price_update with malformed data");
                    return None;
                };
                Some(Self::PriceUpdate { symbol, record })
            }
            RawFrame::MarketStatus { data } => {
                Some(Self::MarketStatus(MarketStatus::from_wire(&data.status)))
            }
            RawFrame::InitialPrices { data } => Some(Self::InitialPrices(parse_snapshot(data))),
            RawFrame::Pong => Some(Self::Pong),
            RawFrame::Subscribed { symbols } => Some(Self::Subscribed { symbols }),
        }
    }

    /// Short name for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PriceUpdate { .. } => "price_update",
            Self::MarketStatus(_) => "market_status",
            Self::InitialPrices(_) => "initial_prices",
            Self::Pong => "pong",
            Self::Subscribed { .. } => "subscribed",
        }
    }
}

fn parse_snapshot(data: Map<String, Value>) -> InitialPrices {
    let mut prices = Vec::with_capacity(data.len());
    let mut failed_count = 0;

    for (raw_symbol, value) in &data {
        match (Symbol::normalize(raw_symbol), PriceRecord::from_value(value)) {
            (Some(symbol), Some(record)) => prices.push((symbol, record)),
            _ => {
                debug!(symbol = %raw_symbol, "Skipping malformed initial_prices entry");
                failed_count += 1;
            }
        }
    }

    prices.sort_by(|a, b| a.0.cmp(&b.0));
    InitialPrices {
        prices,
        failed_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frames_serialize_to_wire_shape() {
        let sub = ClientFrame::subscribe(["ACME", "GLOBEX"]);
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({"action": "subscribe", "symbols": ["ACME", "GLOBEX"]})
        );

        let unsub = ClientFrame::unsubscribe(["ACME"]);
        assert_eq!(
            serde_json::to_value(&unsub).unwrap(),
            json!({"action": "unsubscribe", "symbols": ["ACME"]})
        );

        assert_eq!(ClientFrame::Ping.to_text().unwrap(), r#"{"action":"ping"}"#);
    }

    #[test]
    fn test_parse_price_update() {
        let text = r#"{"type":"price_update","symbol":"acme","data":{"price":101.5,"change":1.2,"volume":500}}"#;
        let frame = FeedFrame::parse(text).unwrap();

        match frame {
            FeedFrame::PriceUpdate { symbol, record } => {
                assert_eq!(symbol.as_str(), "ACME");
                assert_eq!(record.price, 101.5);
                assert_eq!(record.change, 1.2);
                assert_eq!(record.volume, 500.0);
            }
            other => panic!("expected PriceUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_market_status() {
        let frame = FeedFrame::parse(r#"{"type":"market_status","data":{"status":"pre-market"}}"#);
        assert_eq!(frame, Some(FeedFrame::MarketStatus(MarketStatus::PreMarket)));

        let frame = FeedFrame::parse(r#"{"type":"market_status","data":{"status":"halted"}}"#);
        assert_eq!(frame, Some(FeedFrame::MarketStatus(MarketStatus::Unknown)));
    }

    #[test]
    fn test_parse_pong_and_subscribed() {
        assert_eq!(FeedFrame::parse(r#"{"type":"pong"}"#), Some(FeedFrame::Pong));
        assert_eq!(
            FeedFrame::parse(r#"{"type":"subscribed","symbols":["ACME"]}"#),
            Some(FeedFrame::Subscribed {
                symbols: vec!["ACME".to_string()]
            })
        );
    }

    #[test]
    fn test_parse_initial_prices_skips_bad_entries() {
        let text = json!({
            "type": "initial_prices",
            "data": {
                "GLOBEX": {"price": 20.0},
                "ACME": {"price": 10.0, "timestamp": "2024-03-01T09:15:00+00:00"},
                "BROKEN": {"change": 1.0},
                "   ": {"price": 1.0}
            }
        })
        .to_string();

        let Some(FeedFrame::InitialPrices(snapshot)) = FeedFrame::parse(&text) else {
            panic!("expected InitialPrices");
        };
        assert_eq!(snapshot.failed_count, 2);
        let symbols: Vec<&str> = snapshot.prices.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(symbols, vec!["ACME", "GLOBEX"]);
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let cases = [
            "not json at all",
            "",
            "[1,2,3]",
            r#"{"type":"heartbeat_v2"}"#,
            r#"{"no_type":true}"#,
            r#"{"type":"price_update","symbol":"ACME"}"#,
            r#"{"type":"price_update","symbol":"ACME","data":{"change":1.0}}"#,
            r#"{"type":"price_update","data":{"price":1.0}}"#,
            r#"{"type":"price_update","symbol":"","data":{"price":1.0}}"#,
            r#"{"type":"market_status","data":{}}"#,
            r#"{"type":"initial_prices","data":[1,2]}"#,
        ];

        for text in cases {
            assert!(FeedFrame::parse(text).is_none(), "should drop: {text}");
        }
    }
}
