//! Main application orchestration.
//!
//! Owns the one shared feed connection and everything built on it:
//! - `ConnectionManager` for the transport
//! - `SubscriptionRegistry` routing adapter interest
//! - One `PriceAdapter` per watched symbol and a `MarketStatusAdapter`
//! - Periodic status log and metrics sampling

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use pulse_core::{MarketStatus, PriceRecord, Symbol};
use pulse_feed::{
    MarketStatusAdapter, ObserverId, PriceAdapter, PriceFilter, PriceView, SubscriptionRegistry,
};
use pulse_telemetry::Metrics;
use pulse_ws::{ConnectionManager, ConnectionStats};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Turns cumulative `ConnectionStats` into metric increments.
#[derive(Debug, Default)]
struct MetricsSampler {
    last: ConnectionStats,
}

impl MetricsSampler {
    fn sample(&mut self, connection: &ConnectionManager, registry: &SubscriptionRegistry) {
        let stats = connection.stats();

        Metrics::ws_state_set(&connection.state().to_string());
        let last = &self.last;
        Metrics::ws_reconnects(stats.reconnects_scheduled.saturating_sub(last.reconnects_scheduled));
        Metrics::frames("received", stats.frames_received.saturating_sub(last.frames_received));
        Metrics::frames("dropped", stats.frames_dropped.saturating_sub(last.frames_dropped));
        Metrics::frames("ping", stats.pings_sent.saturating_sub(last.pings_sent));
        Metrics::frames("pong", stats.pongs_received.saturating_sub(last.pongs_received));
        if let Some(rtt_ms) = stats.heartbeat.last_rtt_ms {
            Metrics::heartbeat_rtt(rtt_ms as f64);
        }
        Metrics::subscribed_symbols(registry.wanted_symbols().len());

        self.last = stats;
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    connection: ConnectionManager,
    registry: SubscriptionRegistry,
    adapters: Vec<PriceAdapter>,
    status: MarketStatusAdapter,
}

impl Application {
    /// Create a new application. Nothing connects until `run()`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let connection_config = config.connection_config()?;
        info!(url = %connection_config.url, "Feed endpoint resolved");

        let connection = ConnectionManager::new(connection_config);
        let registry = SubscriptionRegistry::new(Arc::new(connection.clone()));

        let mut adapters = Vec::with_capacity(config.stream.symbols.len());
        for raw in &config.stream.symbols {
            let symbol = Symbol::new(raw)
                .map_err(|e| AppError::Config(format!("Invalid watch symbol: {e}")))?;
            if adapters.iter().any(|a: &PriceAdapter| a.symbol() == &symbol) {
                warn!(%symbol, "Duplicate watch symbol ignored");
                continue;
            }
            adapters.push(PriceAdapter::new(registry.clone(), symbol));
        }
        let status = MarketStatusAdapter::new(registry.clone());

        Ok(Self {
            config,
            connection,
            registry,
            adapters,
            status,
        })
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Current view of every watched symbol.
    pub fn price_views(&self) -> Vec<PriceView> {
        self.adapters.iter().map(PriceAdapter::view).collect()
    }

    pub fn market_status(&self) -> MarketStatus {
        self.status.status()
    }

    /// Run until Ctrl-C.
    pub async fn run(mut self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Activate every adapter, log activity until `shutdown` resolves, then
    /// deactivate and disconnect.
    pub async fn run_until<F>(&mut self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        info!(symbols = self.adapters.len(), "Starting price stream");

        let (update_tx, mut update_rx) = mpsc::unbounded_channel::<(Symbol, PriceRecord)>();
        let log_observer = self.registry.observe_prices(
            PriceFilter::Any,
            Arc::new(move |symbol, record| {
                let _ = update_tx.send((symbol.clone(), record.clone()));
            }),
        );

        let activated = self.activate();
        if let Err(e) = activated {
            self.shutdown(log_observer).await;
            return Err(e);
        }

        let mut status_rx = self.status.changes();
        let mut sampler = MetricsSampler::default();
        let mut status_log = tokio::time::interval(Duration::from_millis(
            self.config.stream.status_log_interval_ms,
        ));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,

                Some((symbol, record)) = update_rx.recv() => {
                    Metrics::price_update(symbol.as_str());
                    debug!(
                        %symbol,
                        price = record.price,
                        change = record.change,
                        change_percent = record.change_percent,
                        volume = record.volume,
                        "Price update"
                    );
                }

                Ok(()) = status_rx.changed() => {
                    let status = *status_rx.borrow_and_update();
                    info!(%status, "Market status changed");
                }

                _ = status_log.tick() => {
                    sampler.sample(&self.connection, &self.registry);
                    self.log_summary();
                }
            }
        }

        self.shutdown(log_observer).await;
        sampler.sample(&self.connection, &self.registry);
        Ok(())
    }

    fn activate(&mut self) -> AppResult<()> {
        self.status.activate()?;
        for adapter in &mut self.adapters {
            adapter.activate()?;
        }
        Ok(())
    }

    async fn shutdown(&mut self, log_observer: ObserverId) {
        for adapter in &mut self.adapters {
            adapter.deactivate();
        }
        self.status.deactivate();
        self.registry.remove_observer(log_observer);
        self.connection.disconnect().await;

        let stats = self.connection.stats();
        info!(
            connects = stats.connects,
            reconnects = stats.reconnects_scheduled,
            frames = stats.frames_received,
            dropped = stats.frames_dropped,
            "Price stream stopped"
        );
    }

    fn log_summary(&self) {
        let state = self.connection.state();
        info!(
            %state,
            market_status = %self.status.status(),
            wanted = self.registry.wanted_symbols().len(),
            reconnect_pending = self.connection.is_reconnect_pending(),
            last_error = self.connection.last_error().as_deref().unwrap_or("-"),
            "Stream status"
        );

        for view in self.price_views() {
            match &view.record {
                Some(record) => info!(
                    symbol = %view.symbol,
                    price = record.price,
                    change_percent = record.change_percent,
                    up = record.is_up(),
                    "Last price"
                ),
                None => debug!(symbol = %view.symbol, "No data yet"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(symbols: &[&str]) -> AppConfig {
        let mut config = AppConfig::default();
        config.stream.symbols = symbols.iter().map(|s| s.to_string()).collect();
        config
    }

    #[test]
    fn test_new_builds_one_adapter_per_symbol() {
        let app = Application::new(config_with(&["acme", "GLOBEX", "ACME "])).unwrap();

        let symbols: Vec<String> = app
            .price_views()
            .into_iter()
            .map(|v| v.symbol.to_string())
            .collect();
        assert_eq!(symbols, vec!["ACME", "GLOBEX"]);
        assert_eq!(app.market_status(), MarketStatus::Unknown);
        assert!(!app.connection().is_connected());
    }

    #[test]
    fn test_new_rejects_blank_symbol() {
        assert!(matches!(
            Application::new(config_with(&["ACME", "  "])),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_endpoint() {
        let mut config = AppConfig::default();
        config.api_base_url = "ftp://example.com".to_string();
        assert!(matches!(Application::new(config), Err(AppError::Config(_))));
    }
}
