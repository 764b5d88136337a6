//! Prometheus metrics and structured logging for the pulse price feed.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus gauges and counters for connection health and frame flow

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
