//! Per-symbol price adapter.
//!
//! Holds one symbol's latest `PriceRecord` for a single consumer. Each
//! `activate()` is paired with exactly one `deactivate()`, so switching
//! symbols rapidly never leaks interest in the registry.

use crate::dispatcher::{ObserverId, PriceFilter};
use crate::error::FeedResult;
use crate::registry::SubscriptionRegistry;
use parking_lot::RwLock;
use pulse_core::{PriceRecord, Symbol};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Consumer-facing snapshot of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceView {
    pub symbol: Symbol,
    /// Latest record, `None` until the first update arrives.
    pub record: Option<PriceRecord>,
    /// Live connection indicator.
    pub connected: bool,
    /// Configuration error reported at activation.
    pub error: Option<String>,
}

struct Activation {
    symbol: Symbol,
    observer: ObserverId,
}

/// Per-symbol price adapter.
pub struct PriceAdapter {
    registry: SubscriptionRegistry,
    symbol: Symbol,
    latest: Arc<watch::Sender<Option<PriceRecord>>>,
    error: RwLock<Option<String>>,
    active: Option<Activation>,
}

impl PriceAdapter {
    /// Create an inactive adapter for `symbol`.
    pub fn new(registry: SubscriptionRegistry, symbol: Symbol) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            registry,
            symbol,
            latest: Arc::new(latest),
            error: RwLock::new(None),
            active: None,
        }
    }

    /// Start observing the symbol and register interest in it.
    ///
    /// No-op if already active. On a configuration error the adapter stays
    /// active with the error exposed through `view()`, so `deactivate()`
    /// remains balanced.
    pub fn activate(&mut self) -> FeedResult<()> {
        if self.active.is_some() {
            return Ok(());
        }

        let latest = self.latest.clone();
        let observer = self.registry.observe_prices(
            PriceFilter::Symbol(self.symbol.clone()),
            Arc::new(move |_, record| {
                latest.send_replace(Some(record.clone()));
            }),
        );
        self.active = Some(Activation {
            symbol: self.symbol.clone(),
            observer,
        });
        debug!(symbol = %self.symbol, "Price adapter activated");

        match self.registry.subscribe([self.symbol.as_str()]) {
            Ok(()) => {
                *self.error.write() = None;
                Ok(())
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Price adapter activation failed");
                *self.error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop observing and release interest. No-op if inactive.
    pub fn deactivate(&mut self) {
        let Some(activation) = self.active.take() else {
            return;
        };
        self.registry.remove_observer(activation.observer);
        self.registry.unsubscribe([activation.symbol.as_str()]);
        debug!(symbol = %activation.symbol, "Price adapter deactivated");
    }

    /// Switch to another symbol, re-activating if active.
    ///
    /// The cached record is cleared since it belonged to the old symbol.
    pub fn set_symbol(&mut self, symbol: Symbol) -> FeedResult<()> {
        if symbol == self.symbol {
            return Ok(());
        }
        let was_active = self.is_active();
        self.deactivate();
        self.symbol = symbol;
        self.latest.send_replace(None);
        *self.error.write() = None;

        if was_active {
            self.activate()?;
        }
        Ok(())
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Latest record, `None` if no data yet.
    pub fn latest(&self) -> Option<PriceRecord> {
        self.latest.borrow().clone()
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> PriceView {
        PriceView {
            symbol: self.symbol.clone(),
            record: self.latest(),
            connected: self.registry.is_connected(),
            error: self.error.read().clone(),
        }
    }

    /// Receiver notified on every update.
    pub fn changes(&self) -> watch::Receiver<Option<PriceRecord>> {
        self.latest.subscribe()
    }
}

impl Drop for PriceAdapter {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for PriceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceAdapter")
            .field("symbol", &self.symbol)
            .field("active", &self.is_active())
            .field("latest", &self.latest())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_ws::{ClientFrame, FeedLink, MockFeedLink};

    fn setup() -> (Arc<MockFeedLink>, SubscriptionRegistry) {
        let link = Arc::new(MockFeedLink::new());
        let registry = SubscriptionRegistry::new(link.clone());
        (link, registry)
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn test_no_data_until_first_update() {
        let (link, registry) = setup();
        let mut adapter = PriceAdapter::new(registry, sym("ACME"));
        adapter.activate().unwrap();
        link.open();

        let view = adapter.view();
        assert!(view.record.is_none());
        assert!(view.connected);
        assert!(view.error.is_none());
    }

    #[test]
    fn test_receives_only_its_symbol() {
        let (link, registry) = setup();
        let mut adapter = PriceAdapter::new(registry, sym("ACME"));
        adapter.activate().unwrap();
        link.open();

        link.inject(r#"{"type":"price_update","symbol":"GLOBEX","data":{"price":5.0}}"#);
        assert!(adapter.latest().is_none());

        link.inject(r#"{"type":"price_update","symbol":"ACME","data":{"price":101.5}}"#);
        assert_eq!(adapter.latest().unwrap().price, 101.5);
    }

    #[test]
    fn test_activate_twice_is_balanced() {
        let (link, registry) = setup();
        link.open();
        let mut adapter = PriceAdapter::new(registry.clone(), sym("ACME"));

        adapter.activate().unwrap();
        adapter.activate().unwrap();
        assert_eq!(registry.interest("ACME"), 1);

        adapter.deactivate();
        adapter.deactivate();
        assert_eq!(registry.interest("ACME"), 0);
        assert_eq!(registry.observer_count(), 0);
        assert_eq!(
            link.sent_frames(),
            vec![
                ClientFrame::subscribe(["ACME"]),
                ClientFrame::unsubscribe(["ACME"])
            ]
        );
    }

    #[test]
    fn test_set_symbol_moves_interest() {
        let (link, registry) = setup();
        link.open();
        let mut adapter = PriceAdapter::new(registry.clone(), sym("ACME"));
        adapter.activate().unwrap();
        link.inject(r#"{"type":"price_update","symbol":"ACME","data":{"price":1.0}}"#);

        adapter.set_symbol(sym("GLOBEX")).unwrap();

        assert!(adapter.latest().is_none());
        assert_eq!(registry.wanted_symbols(), vec!["GLOBEX"]);
        assert_eq!(registry.observer_count(), 1);
    }

    #[test]
    fn test_drop_deactivates() {
        let (link, registry) = setup();
        link.open();
        {
            let mut adapter = PriceAdapter::new(registry.clone(), sym("ACME"));
            adapter.activate().unwrap();
        }
        assert!(registry.wanted_symbols().is_empty());
        assert_eq!(registry.observer_count(), 0);
        assert!(link.is_connected());
    }

    #[test]
    fn test_configuration_error_is_visible() {
        let (link, registry) = setup();
        link.set_invalid_endpoint("endpoint address is empty");
        let mut adapter = PriceAdapter::new(registry.clone(), sym("ACME"));

        assert!(adapter.activate().is_err());
        let view = adapter.view();
        assert!(view.error.unwrap().contains("endpoint address is empty"));
        assert!(!view.connected);

        adapter.deactivate();
        assert_eq!(registry.interest("ACME"), 0);
    }

    #[tokio::test]
    async fn test_changes_notifies_on_update() {
        let (link, registry) = setup();
        let mut adapter = PriceAdapter::new(registry, sym("ACME"));
        adapter.activate().unwrap();
        link.open();
        let mut rx = adapter.changes();

        link.inject(r#"{"type":"price_update","symbol":"ACME","data":{"price":2.5}}"#);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().price, 2.5);
    }
}
