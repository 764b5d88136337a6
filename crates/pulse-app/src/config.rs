//! Application configuration.

use crate::error::{AppError, AppResult};
use pulse_ws::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// Stream timing and watchlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// First reconnect delay (ms). Default: 1,000.
    #[serde(default = "default_backoff_floor_ms")]
    pub backoff_floor_ms: u64,
    /// Maximum reconnect delay (ms). Default: 30,000.
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
    /// Ping interval while connected (ms). Default: 30,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Single open attempt timeout (ms). Default: 10,000.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    /// Stalled frame write limit before the session is dropped (ms). Default: 10,000.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Symbols to watch.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Status summary log interval (ms). Default: 60,000.
    #[serde(default = "default_status_log_interval_ms")]
    pub status_log_interval_ms: u64,
}

fn default_backoff_floor_ms() -> u64 {
    1_000
}

fn default_backoff_ceiling_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_open_timeout_ms() -> u64 {
    10_000
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_status_log_interval_ms() -> u64 {
    60_000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backoff_floor_ms: default_backoff_floor_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            symbols: Vec::new(),
            status_log_interval_ms: default_status_log_interval_ms(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend base URL (http or https).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Price stream path appended to the base URL.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Stream settings.
    #[serde(default)]
    pub stream: StreamConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_stream_path() -> String {
    "/api/ws/prices".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            stream_path: default_stream_path(),
            stream: StreamConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse from TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Derive the feed endpoint: `http`→`ws`, `https`→`wss`, then append
    /// the stream path.
    pub fn stream_url(&self) -> AppResult<String> {
        let base = self.api_base_url.trim();
        let parsed = url::Url::parse(base)
            .map_err(|e| AppError::Config(format!("Invalid api_base_url {base:?}: {e}")))?;

        let ws_scheme = match parsed.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(AppError::Config(format!(
                    "api_base_url must be http or https, got {other}"
                )))
            }
        };

        let rest = base[parsed.scheme().len()..].trim_end_matches('/');
        let path = self.stream_path.trim();
        let url = if path.is_empty() || path.starts_with('/') {
            format!("{ws_scheme}{rest}{path}")
        } else {
            format!("{ws_scheme}{rest}/{path}")
        };

        pulse_ws::validate_endpoint(&url)
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(url)
    }

    /// Check timing values.
    pub fn validate(&self) -> AppResult<()> {
        let stream = &self.stream;
        if stream.backoff_floor_ms == 0 {
            return Err(AppError::Config("backoff_floor_ms must be > 0".to_string()));
        }
        if stream.backoff_ceiling_ms < stream.backoff_floor_ms {
            return Err(AppError::Config(format!(
                "backoff_ceiling_ms ({}) must be >= backoff_floor_ms ({})",
                stream.backoff_ceiling_ms, stream.backoff_floor_ms
            )));
        }
        if stream.heartbeat_interval_ms == 0 {
            return Err(AppError::Config(
                "heartbeat_interval_ms must be > 0".to_string(),
            ));
        }
        if stream.write_timeout_ms == 0 {
            return Err(AppError::Config("write_timeout_ms must be > 0".to_string()));
        }
        if stream.status_log_interval_ms == 0 {
            return Err(AppError::Config(
                "status_log_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the connection configuration.
    pub fn connection_config(&self) -> AppResult<ConnectionConfig> {
        self.validate()?;
        Ok(ConnectionConfig {
            url: self.stream_url()?,
            backoff_floor_ms: self.stream.backoff_floor_ms,
            backoff_ceiling_ms: self.stream.backoff_ceiling_ms,
            heartbeat_interval_ms: self.stream.heartbeat_interval_ms,
            open_timeout_ms: self.stream.open_timeout_ms,
            write_timeout_ms: self.stream.write_timeout_ms,
        })
    }
}
