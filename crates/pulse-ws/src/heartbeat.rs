//! Heartbeat bookkeeping for the feed connection.
//!
//! A `{"action":"ping"}` frame goes out on every interval tick while the
//! connection is open. Pongs are recorded for diagnostics only: a missing
//! pong is not treated as a failure, the transport's own close/error
//! signalling drives reconnection.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Default ping interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Tracks ping/pong timing for the live session.
#[derive(Debug)]
pub struct HeartbeatTracker {
    /// How often to send ping.
    interval: Duration,
    /// Last ping sent time.
    last_ping: RwLock<Option<DateTime<Utc>>>,
    /// Last pong received time.
    last_pong: RwLock<Option<DateTime<Utc>>>,
    /// Round trip of the most recent ping/pong pair.
    last_rtt_ms: RwLock<Option<i64>>,
}

impl HeartbeatTracker {
    /// Create a new heartbeat tracker.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_ping: RwLock::new(None),
            last_pong: RwLock::new(None),
            last_rtt_ms: RwLock::new(None),
        }
    }

    /// Ping interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reset heartbeat state (called on connection).
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_pong.write() = None;
        *self.last_rtt_ms.write() = None;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&self) {
        let now = Utc::now();
        *self.last_ping.write() = Some(now);
        debug!(time = %now, "Recorded ping");
    }

    /// Record that a pong was received.
    pub fn record_pong(&self) {
        let now = Utc::now();
        *self.last_pong.write() = Some(now);

        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (now - ping_time).num_milliseconds();
            *self.last_rtt_ms.write() = Some(rtt_ms);
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Get heartbeat statistics.
    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            last_ping: *self.last_ping.read(),
            last_pong: *self.last_pong.read(),
            last_rtt_ms: *self.last_rtt_ms.read(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_rtt_ms: Option<i64>,
}
