//! WebSocket error types.
//!
//! Only `InvalidEndpoint` ever leaves the public streaming API. The other
//! variants describe transient failures that are logged, recorded as the
//! last error, and routed into the reconnect path.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Check if retrying can never help (configuration problem).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidEndpoint(_))
    }
}

pub type WsResult<T> = Result<T, WsError>;
