//! Prometheus metrics for the price stream.
//!
//! Covers:
//! - Connection state and reconnects
//! - Inbound/outbound frame flow
//! - Heartbeat round trip
//! - Wanted-symbol set size and per-symbol updates
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A failure means a
//! duplicate metric name, which is a startup bug. These panics only occur
//! during static initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

/// WebSocket connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pulse_ws_connected",
        "Feed connection state (1=connected)"
    )
    .unwrap()
});

/// Connection state machine current state.
/// Labels: state (disconnected/connecting/connected)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_ws_state",
        "Feed connection current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnects scheduled after unplanned closes.
pub static WS_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pulse_ws_reconnect_total",
        "Total reconnects scheduled after unplanned closes"
    )
    .unwrap()
});

/// Frames by kind.
/// Labels: kind (received/dropped/ping/pong)
pub static FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("pulse_frames_total", "Total feed frames by kind", &["kind"])
        .unwrap()
});

/// Heartbeat round trip of the last ping/pong pair.
pub static HEARTBEAT_RTT_MS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pulse_heartbeat_rtt_ms",
        "Round trip of the most recent heartbeat in milliseconds"
    )
    .unwrap()
});

/// Symbols with at least one interested consumer.
pub static SUBSCRIBED_SYMBOLS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pulse_subscribed_symbols",
        "Symbols wanted by at least one consumer"
    )
    .unwrap()
});

/// Price updates delivered per symbol.
pub static PRICE_UPDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_price_updates_total",
        "Price updates delivered to consumers",
        &["symbol"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record connection state, updating both the boolean and state gauges.
    pub fn ws_state_set(state: &str) {
        for s in &["disconnected", "connecting", "connected"] {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    /// Record reconnects scheduled since the last sample.
    pub fn ws_reconnects(count: u64) {
        WS_RECONNECT_TOTAL.inc_by(count);
    }

    /// Record frames of `kind` since the last sample.
    pub fn frames(kind: &str, count: u64) {
        FRAMES_TOTAL.with_label_values(&[kind]).inc_by(count);
    }

    /// Record the latest heartbeat round trip.
    pub fn heartbeat_rtt(rtt_ms: f64) {
        HEARTBEAT_RTT_MS.set(rtt_ms);
    }

    /// Set the wanted-symbol count.
    pub fn subscribed_symbols(count: usize) {
        SUBSCRIBED_SYMBOLS.set(count as i64);
    }

    /// Record one delivered price update.
    pub fn price_update(symbol: &str) {
        PRICE_UPDATES_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
