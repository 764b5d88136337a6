//! Market status adapter.

use crate::dispatcher::ObserverId;
use crate::error::FeedResult;
use crate::registry::SubscriptionRegistry;
use parking_lot::RwLock;
use pulse_core::MarketStatus;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Last-seen market status for one consumer.
///
/// Observes the status side channel only and adds no symbol interest.
/// Reads `Unknown` until the first status frame arrives.
pub struct MarketStatusAdapter {
    registry: SubscriptionRegistry,
    status: Arc<watch::Sender<MarketStatus>>,
    error: RwLock<Option<String>>,
    observer: Option<ObserverId>,
}

impl MarketStatusAdapter {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        let (status, _) = watch::channel(MarketStatus::Unknown);
        Self {
            registry,
            status: Arc::new(status),
            error: RwLock::new(None),
            observer: None,
        }
    }

    /// Start observing status frames, connecting if needed.
    pub fn activate(&mut self) -> FeedResult<()> {
        if self.observer.is_some() {
            return Ok(());
        }

        let status = self.status.clone();
        self.observer = Some(self.registry.observe_status(Arc::new(move |next| {
            status.send_if_modified(|current| {
                let changed = *current != next;
                *current = next;
                changed
            });
        })));
        debug!("Market status adapter activated");

        match self.registry.ensure_connected() {
            Ok(()) => {
                *self.error.write() = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Market status adapter activation failed");
                *self.error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop observing. The last status is kept.
    pub fn deactivate(&mut self) {
        if let Some(id) = self.observer.take() {
            self.registry.remove_observer(id);
            debug!("Market status adapter deactivated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.observer.is_some()
    }

    /// Last-seen status.
    pub fn status(&self) -> MarketStatus {
        *self.status.borrow()
    }

    /// Configuration error reported at activation.
    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    /// Live connection indicator.
    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    /// Receiver notified when the status changes.
    pub fn changes(&self) -> watch::Receiver<MarketStatus> {
        self.status.subscribe()
    }
}

impl Drop for MarketStatusAdapter {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for MarketStatusAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStatusAdapter")
            .field("status", &self.status())
            .field("active", &self.is_active())
            .finish()
    }
}
