//! Subscription routing and consumer adapters for the pulse price feed.
//!
//! Many independent consumers share one feed connection:
//! - `SubscriptionRegistry` reference-counts symbol interest and turns it
//!   into batched subscribe/unsubscribe frames
//! - `Dispatcher` fans the connection's single-slot callbacks out to any
//!   number of observers
//! - `PriceAdapter`, `MarketStatusAdapter` and `PriceBoard` hold
//!   consumer-ready state

pub mod dispatcher;
pub mod error;
pub mod price_adapter;
pub mod price_board;
pub mod registry;
pub mod status_adapter;

pub use dispatcher::{Dispatcher, ObserverId, PriceFilter};
pub use error::{FeedError, FeedResult};
pub use price_adapter::{PriceAdapter, PriceView};
pub use price_board::PriceBoard;
pub use registry::SubscriptionRegistry;
pub use status_adapter::MarketStatusAdapter;
