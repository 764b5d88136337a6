//! Single-slot frame callbacks at the transport-dispatch layer.
//!
//! Each slot holds at most one handler and installing a new one replaces
//! the old one. Installers get the previous handler back so a component
//! composing onto the slot can chain to it instead of silently dropping it.

use crate::message::FeedFrame;
use parking_lot::RwLock;
use pulse_core::{MarketStatus, PriceRecord, Symbol};
use std::sync::Arc;
use tracing::{debug, trace};

/// Callback for per-symbol price updates.
pub type PriceHandler = Arc<dyn Fn(&Symbol, &PriceRecord) + Send + Sync>;

/// Callback for market status changes.
pub type StatusHandler = Arc<dyn Fn(MarketStatus) + Send + Sync>;

/// Price and status callback slots.
#[derive(Default)]
pub struct FrameHandlers {
    price: RwLock<Option<PriceHandler>>,
    status: RwLock<Option<StatusHandler>>,
}

impl FrameHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the price handler, returning the one it replaces.
    pub fn on_price_update(&self, handler: PriceHandler) -> Option<PriceHandler> {
        self.price.write().replace(handler)
    }

    /// Install the market status handler, returning the one it replaces.
    pub fn on_market_status(&self, handler: StatusHandler) -> Option<StatusHandler> {
        self.status.write().replace(handler)
    }

    /// Current price handler.
    pub fn price_handler(&self) -> Option<PriceHandler> {
        self.price.read().clone()
    }

    /// Current market status handler.
    pub fn status_handler(&self) -> Option<StatusHandler> {
        self.status.read().clone()
    }

    /// Invoke the handler for a parsed frame.
    ///
    /// Snapshots are delivered as one price update per entry. Pong and
    /// subscription acks have no handler here.
    pub fn dispatch(&self, frame: &FeedFrame) {
        match frame {
            FeedFrame::PriceUpdate { symbol, record } => {
                if let Some(handler) = self.price_handler() {
                    handler(symbol, record);
                } else {
                    trace!(%symbol, "No price handler installed");
                }
            }
            FeedFrame::InitialPrices(snapshot) => {
                debug!(
                    count = snapshot.prices.len(),
                    failed = snapshot.failed_count,
                    "Applying initial prices"
                );
                if let Some(handler) = self.price_handler() {
                    for (symbol, record) in &snapshot.prices {
                        handler(symbol, record);
                    }
                }
            }
            FeedFrame::MarketStatus(status) => {
                if let Some(handler) = self.status_handler() {
                    handler(*status);
                }
            }
            FeedFrame::Pong | FeedFrame::Subscribed { .. } => {}
        }
    }
}

impl std::fmt::Debug for FrameHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHandlers")
            .field("price", &self.price.read().is_some())
            .field("status", &self.status.read().is_some())
            .finish()
    }
}
