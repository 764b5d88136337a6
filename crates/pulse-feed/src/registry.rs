//! Reference-counted subscription registry.
//!
//! Adapters say "I want symbol X" and "I no longer want symbol X"; the
//! registry keeps one interest count per symbol and turns 0→1 and 1→0
//! transitions into batched subscribe/unsubscribe frames on the shared
//! link. The full wanted set is replayed by the link on every connect.
//!
//! Lock order: interest table, then the link. The link calls back into the
//! table only through `ReplaySource`, which takes the table first.

use crate::dispatcher::{Dispatcher, ObserverId, PriceFilter};
use crate::error::FeedResult;
use parking_lot::Mutex;
use pulse_core::Symbol;
use pulse_ws::{ClientFrame, FeedLink, PriceHandler, ReplaySource, StatusHandler};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-symbol interest counts.
#[derive(Debug, Default)]
struct InterestTable {
    counts: Mutex<HashMap<Symbol, usize>>,
}

impl InterestTable {
    fn sorted(counts: &HashMap<Symbol, usize>) -> Vec<String> {
        let mut symbols: Vec<String> = counts.keys().map(|s| s.to_string()).collect();
        symbols.sort();
        symbols
    }
}

impl ReplaySource for InterestTable {
    fn replay_on_connect(&self, mark_connected: &mut dyn FnMut()) -> Vec<String> {
        let counts = self.counts.lock();
        mark_connected();
        Self::sorted(&counts)
    }
}

/// Normalize and deduplicate, skipping blanks.
fn normalize_all<I, S>(symbols: I) -> BTreeSet<Symbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    symbols
        .into_iter()
        .filter_map(|raw| {
            let symbol = Symbol::normalize(raw.as_ref());
            if symbol.is_none() {
                debug!(raw = raw.as_ref(), "Ignoring blank symbol");
            }
            symbol
        })
        .collect()
}

/// Subscription registry shared by every adapter.
///
/// Cheap to clone; clones share the interest table and observers.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    link: Arc<dyn FeedLink>,
    interest: Arc<InterestTable>,
    dispatcher: Arc<Dispatcher>,
}

impl SubscriptionRegistry {
    /// Create a registry over `link`, registering as its replay source and
    /// attaching the observer dispatcher to its frame handlers.
    pub fn new(link: Arc<dyn FeedLink>) -> Self {
        let interest = Arc::new(InterestTable::default());
        link.set_replay_source(interest.clone());

        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.attach(link.handlers());

        Self {
            link,
            interest,
            dispatcher,
        }
    }

    /// Register interest in `symbols`.
    ///
    /// Symbols whose count goes 0→1 are sent in one subscribe frame if the
    /// link is connected; otherwise a connect is triggered and the replay
    /// picks them up.
    ///
    /// # Errors
    ///
    /// Only configuration errors from `connect()`. The interest is kept
    /// either way, so the matching `unsubscribe` stays balanced.
    pub fn subscribe<I, S>(&self, symbols: I) -> FeedResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = normalize_all(symbols);
        if symbols.is_empty() {
            return Ok(());
        }

        let mut counts = self.interest.counts.lock();
        let mut added = Vec::new();
        for symbol in symbols {
            let count = counts.entry(symbol.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                added.push(symbol.into_inner());
            }
        }

        if self.link.is_connected() {
            if !added.is_empty() {
                debug!(symbols = ?added, "Subscribing");
                self.link.send(&ClientFrame::subscribe(added));
            }
            return Ok(());
        }
        drop(counts);

        debug!(pending = ?added, "Link not connected, connecting");
        if let Err(e) = self.link.connect() {
            warn!(error = %e, "Cannot connect to feed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Release interest in `symbols`.
    ///
    /// Symbols whose count returns to 0 leave the wanted set and are sent in
    /// one unsubscribe frame if connected. Symbols with no interest are
    /// ignored.
    pub fn unsubscribe<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = normalize_all(symbols);
        let mut counts = self.interest.counts.lock();
        let mut removed = Vec::new();

        for symbol in symbols {
            let Some(count) = counts.get_mut(&symbol) else {
                debug!(%symbol, "Unsubscribe without interest ignored");
                continue;
            };
            *count -= 1;
            if *count == 0 {
                counts.remove(&symbol);
                removed.push(symbol.into_inner());
            }
        }

        if !removed.is_empty() && self.link.is_connected() {
            debug!(symbols = ?removed, "Unsubscribing");
            self.link.send(&ClientFrame::unsubscribe(removed));
        }
    }

    /// Make sure the link is connected or connecting, without adding
    /// interest. Used by consumers of the status side channel.
    pub fn ensure_connected(&self) -> FeedResult<()> {
        if self.link.is_connected() {
            return Ok(());
        }
        self.link.connect().map_err(Into::into)
    }

    /// Sorted snapshot of the wanted set.
    pub fn wanted_symbols(&self) -> Vec<String> {
        InterestTable::sorted(&self.interest.counts.lock())
    }

    /// Interest count for `symbol` (0 if not wanted).
    pub fn interest(&self, symbol: &str) -> usize {
        Symbol::normalize(symbol)
            .and_then(|s| self.interest.counts.lock().get(&s).copied())
            .unwrap_or(0)
    }

    /// Register a price observer.
    pub fn observe_prices(&self, filter: PriceFilter, callback: PriceHandler) -> ObserverId {
        self.dispatcher.observe_prices(filter, callback)
    }

    /// Register a market status observer.
    pub fn observe_status(&self, callback: StatusHandler) -> ObserverId {
        self.dispatcher.observe_status(callback)
    }

    /// Remove an observer.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.dispatcher.remove(id)
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.dispatcher.observer_count()
    }

    /// Check if the shared link is connected.
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Most recent connection error.
    pub fn last_error(&self) -> Option<String> {
        self.link.last_error()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("wanted", &self.wanted_symbols())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
