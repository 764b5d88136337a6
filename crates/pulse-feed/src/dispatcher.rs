//! Observer-list fan-out above the single-slot frame handlers.
//!
//! The connection exposes one price slot and one status slot. The
//! dispatcher claims each slot once, chaining to whatever handler was
//! installed before it, and fans every event out to any number of
//! observers. Adding or removing an observer never touches the slots.

use dashmap::DashMap;
use pulse_core::{MarketStatus, PriceRecord, Symbol};
use pulse_ws::{FrameHandlers, PriceHandler, StatusHandler};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Handle returned when registering an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Which price updates an observer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceFilter {
    /// Every symbol.
    Any,
    /// One symbol.
    Symbol(Symbol),
    /// Any symbol in the set.
    Symbols(HashSet<Symbol>),
}

impl PriceFilter {
    pub fn matches(&self, symbol: &Symbol) -> bool {
        match self {
            Self::Any => true,
            Self::Symbol(s) => s == symbol,
            Self::Symbols(set) => set.contains(symbol),
        }
    }
}

struct PriceObserver {
    filter: PriceFilter,
    callback: PriceHandler,
}

/// Event fan-out to registered observers.
#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    prices: DashMap<ObserverId, PriceObserver>,
    statuses: DashMap<ObserverId, StatusHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install this dispatcher on the frame handler slots, preserving any
    /// handler already installed there.
    pub fn attach(self: &Arc<Self>, handlers: &FrameHandlers) {
        let previous = handlers.price_handler();
        let dispatcher = self.clone();
        handlers.on_price_update(Arc::new(move |symbol, record| {
            if let Some(previous) = &previous {
                previous(symbol, record);
            }
            dispatcher.publish_price(symbol, record);
        }));

        let previous = handlers.status_handler();
        let dispatcher = self.clone();
        handlers.on_market_status(Arc::new(move |status| {
            if let Some(previous) = &previous {
                previous(status);
            }
            dispatcher.publish_status(status);
        }));
    }

    fn next_id(&self) -> ObserverId {
        ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a price observer.
    pub fn observe_prices(&self, filter: PriceFilter, callback: PriceHandler) -> ObserverId {
        let id = self.next_id();
        self.prices.insert(id, PriceObserver { filter, callback });
        id
    }

    /// Register a market status observer.
    pub fn observe_status(&self, callback: StatusHandler) -> ObserverId {
        let id = self.next_id();
        self.statuses.insert(id, callback);
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        self.prices.remove(&id).is_some() || self.statuses.remove(&id).is_some()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.prices.len() + self.statuses.len()
    }

    /// Deliver a price update to every matching observer.
    pub fn publish_price(&self, symbol: &Symbol, record: &PriceRecord) {
        // Collected first so observers may add or remove observers.
        let targets: Vec<PriceHandler> = self
            .prices
            .iter()
            .filter(|entry| entry.filter.matches(symbol))
            .map(|entry| entry.callback.clone())
            .collect();

        trace!(%symbol, observers = targets.len(), "Publishing price");
        for callback in targets {
            callback(symbol, record);
        }
    }

    /// Deliver a status change to every status observer.
    pub fn publish_status(&self, status: MarketStatus) {
        let targets: Vec<StatusHandler> =
            self.statuses.iter().map(|entry| entry.value().clone()).collect();

        for callback in targets {
            callback(status);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("price_observers", &self.prices.len())
            .field("status_observers", &self.statuses.len())
            .finish()
    }
}
