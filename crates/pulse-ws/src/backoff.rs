//! Reconnect backoff state.
//!
//! Delays run floor, 2×floor, 4×floor, … and hold at the ceiling. There is
//! no jitter and no attempt limit: the sequence before attempt `k` is
//! exactly `min(floor * 2^(k-1), ceiling)`.

use std::time::Duration;

/// Exponential reconnect backoff, owned by the connection manager.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `floor`. A ceiling below the floor is
    /// raised to the floor.
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay to wait before the next attempt. Doubles the stored delay
    /// (ceiling applied) for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .unwrap_or(self.ceiling)
            .min(self.ceiling);
        delay
    }

    /// Delay that the next failure would wait.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Reset to the floor (called once per successful connect).
    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}
