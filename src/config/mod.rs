//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, `*` for any
    pub client_origin: String,

    /// Base URL of the AI decision service
    pub ai_service_url: String,
    /// How often an AI loop asks for a new plan
    pub ai_interval: Duration,
    /// Per-request timeout for the decision service
    pub ai_request_timeout: Duration,

    /// How long a room may stay without any player before it is dropped
    pub room_eviction_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when both are set
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:7000".to_string()),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),

            ai_service_url: lookup("AI_SERVICE_URL")
                .unwrap_or_else(|| "http://ai-service:7010".to_string()),
            ai_interval: millis(&lookup, "AI_INTERVAL_MS", 1_000)?,
            ai_request_timeout: millis(&lookup, "AI_REQUEST_TIMEOUT_MS", 800)?,

            room_eviction_delay: millis(&lookup, "ROOM_EVICTION_MS", 60_000)?,
        })
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or(ConfigError::Invalid { key, value: raw }),
        None => Ok(Duration::from_millis(default)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,
}
