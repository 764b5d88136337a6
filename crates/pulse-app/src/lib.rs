//! Pulse price stream application.
//!
//! Composition root that wires one shared feed connection to many
//! consumers:
//! - Configuration loading and endpoint derivation
//! - One `ConnectionManager` and one `SubscriptionRegistry` per process
//! - Price adapters per watched symbol plus a market status adapter

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, StreamConfig};
pub use error::{AppError, AppResult};
