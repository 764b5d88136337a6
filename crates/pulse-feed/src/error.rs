//! Feed error types.

use pulse_ws::WsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connection error: {0}")]
    Connection(#[from] WsError),
}

impl FeedError {
    /// Check if the error is a configuration problem that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_fatal(),
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
