//! Pulse price stream - Entry Point
//!
//! Streams live prices for the configured watchlist over one shared feed
//! connection and logs them until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Pulse price stream client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PULSE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Watch these symbols instead of the configured list
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    pulse_ws::init_crypto();

    let args = Args::parse();

    pulse_telemetry::init_logging()?;

    info!("Starting pulse-stream v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > PULSE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("PULSE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = pulse_app::AppConfig::from_file(&config_path)?;
    if !args.symbols.is_empty() {
        config.stream.symbols = args.symbols;
    }
    info!(
        api_base_url = %config.api_base_url,
        symbols = ?config.stream.symbols,
        "Configuration loaded"
    );

    let app = pulse_app::Application::new(config)?;
    app.run().await?;

    Ok(())
}
