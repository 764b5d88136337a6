//! Multi-symbol price board (watchlist).

use crate::dispatcher::{ObserverId, PriceFilter};
use crate::error::FeedResult;
use crate::registry::SubscriptionRegistry;
use dashmap::DashMap;
use pulse_core::{PriceRecord, Symbol};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Latest prices for a fixed set of symbols.
///
/// Activation registers interest in every symbol in one registry call;
/// deactivation releases exactly that interest.
pub struct PriceBoard {
    registry: SubscriptionRegistry,
    symbols: BTreeSet<Symbol>,
    prices: Arc<DashMap<Symbol, PriceRecord>>,
    observer: Option<ObserverId>,
}

impl PriceBoard {
    /// Create an inactive board. Blank symbols are skipped.
    pub fn new<I, S>(registry: SubscriptionRegistry, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = symbols
            .into_iter()
            .filter_map(|s| Symbol::normalize(s.as_ref()))
            .collect();
        Self {
            registry,
            symbols,
            prices: Arc::new(DashMap::new()),
            observer: None,
        }
    }

    /// Start observing every symbol on the board.
    pub fn activate(&mut self) -> FeedResult<()> {
        if self.observer.is_some() || self.symbols.is_empty() {
            return Ok(());
        }

        let prices = self.prices.clone();
        let filter: HashSet<Symbol> = self.symbols.iter().cloned().collect();
        self.observer = Some(self.registry.observe_prices(
            PriceFilter::Symbols(filter),
            Arc::new(move |symbol, record| {
                prices.insert(symbol.clone(), record.clone());
            }),
        ));
        debug!(count = self.symbols.len(), "Price board activated");

        self.registry.subscribe(self.symbols.iter().map(Symbol::as_str))
    }

    /// Stop observing and release interest.
    pub fn deactivate(&mut self) {
        let Some(id) = self.observer.take() else {
            return;
        };
        self.registry.remove_observer(id);
        self.registry.unsubscribe(self.symbols.iter().map(Symbol::as_str));
        debug!(count = self.symbols.len(), "Price board deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.observer.is_some()
    }

    /// Symbols on the board, sorted.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().cloned().collect()
    }

    /// Latest record for `symbol`.
    pub fn get(&self, symbol: &str) -> Option<PriceRecord> {
        let symbol = Symbol::normalize(symbol)?;
        self.prices.get(&symbol).map(|r| r.value().clone())
    }

    /// Every symbol with data, sorted by symbol.
    pub fn prices(&self) -> Vec<(Symbol, PriceRecord)> {
        let mut prices: Vec<_> = self
            .prices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        prices.sort_by(|a, b| a.0.cmp(&b.0));
        prices
    }

    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }
}

impl Drop for PriceBoard {
    fn drop(&mut self) {
        self.deactivate();
    }
}
