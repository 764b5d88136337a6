//! Core domain types for the pulse market-data stream.
//!
//! This crate provides the values that flow from the feed to consumers:
//! - `Symbol`: Normalized instrument identifier
//! - `PriceRecord`: Latest known price snapshot for one symbol
//! - `MarketStatus`: Side-channel trading session status

pub mod error;
pub mod market_status;
pub mod price;
pub mod symbol;

pub use error::{CoreError, Result};
pub use market_status::MarketStatus;
pub use price::PriceRecord;
pub use symbol::Symbol;
