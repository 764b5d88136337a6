//! WebSocket client for the pulse price feed.
//!
//! Provides robust feed connectivity with:
//! - A single shared connection with idempotent connect/disconnect
//! - Automatic reconnection with exponential backoff
//! - Wanted-set replay on every (re)connect
//! - Periodic ping heartbeat
//! - Single-slot price and market status callbacks

pub mod backoff;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod heartbeat;
pub mod link;
pub mod message;

pub use backoff::Backoff;
pub use connection::{
    validate_endpoint, ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats,
};
pub use error::{WsError, WsResult};
pub use handlers::{FrameHandlers, PriceHandler, StatusHandler};
pub use heartbeat::{HeartbeatStats, HeartbeatTracker};
pub use link::{FeedLink, MockFeedLink, ReplaySource};
pub use message::{ClientFrame, FeedFrame, InitialPrices};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any wss:// connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
