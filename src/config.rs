//! Environment variable names and the server configuration built from them.
//!
//! The core types stay decoupled from environment access; only
//! [`ServerConfig::from_env`] reads the process environment.

use crate::batcher::{BatcherConfig, DeliveryPolicy};
use std::time::Duration;

/// Query (HTTP) listener address, e.g. `:8080`, `127.0.0.1:8080` or
/// `localhost:8080`.
pub const HTTP_ADDR_ENV: &str = "HTTP_ADDR";

/// Ingestion (RPC) listener address.
pub const GRPC_ADDR_ENV: &str = "GRPC_ADDR";

/// Storage DSN, see [`crate::backend::parse_dsn`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Flush-size threshold; non-positive means default.
pub const INGEST_BATCH_SIZE_ENV: &str = "INGEST_BATCH_SIZE";

/// Flush interval in milliseconds; non-positive means default.
pub const INGEST_MAX_DELAY_MS_ENV: &str = "INGEST_MAX_DELAY_MS";

pub const INGEST_QUEUE_MULTIPLIER_ENV: &str = "INGEST_QUEUE_MULTIPLIER";
pub const INGEST_MAX_IN_FLIGHT_ENV: &str = "INGEST_MAX_IN_FLIGHT";
pub const INGEST_SHUTDOWN_TIMEOUT_MS_ENV: &str = "INGEST_SHUTDOWN_TIMEOUT_MS";

/// `best-effort` (default) or `acknowledged`.
pub const INGEST_DELIVERY_ENV: &str = "INGEST_DELIVERY";

/// Retry budget for the `acknowledged` delivery policy.
pub const INGEST_MAX_RETRIES_ENV: &str = "INGEST_MAX_RETRIES";

/// Optional ClickHouse TTL in days.
pub const RETENTION_DAYS_ENV: &str = "RETENTION_DAYS";

/// `tracing_subscriber::EnvFilter` directive, e.g. `info,logbatch=debug`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// `text` (default) or `json`.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HTTP_ADDR: &str = ":8080";
pub const DEFAULT_GRPC_ADDR: &str = ":8081";
pub const DEFAULT_DATABASE_URL: &str = "clickhouse://default:@localhost:8123/observability";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be an integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} is not a valid listen address: {value:?}")]
    InvalidAddr { key: &'static str, value: String },

    #[error("{key} must be one of {expected}, got {value:?}")]
    InvalidChoice {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Settings for [`crate::init::init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port`; the host may be a name, resolved when binding.
    pub http_addr: String,
    pub ingest_addr: String,
    pub database_url: String,
    pub batcher: BatcherConfig,
    pub retention_days: Option<u32>,
    pub log: LogConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing variables take their defaults. Numeric values that do not
    /// parse are an error; non-positive batch settings fall back to the
    /// batcher defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let batcher = BatcherConfig {
            flush_size: positive_or_zero(INGEST_BATCH_SIZE_ENV)?,
            flush_interval: Duration::from_millis(positive_or_zero(INGEST_MAX_DELAY_MS_ENV)? as u64),
            queue_multiplier: positive_or_zero(INGEST_QUEUE_MULTIPLIER_ENV)?,
            max_in_flight: positive_or_zero(INGEST_MAX_IN_FLIGHT_ENV)?,
            shutdown_timeout: match positive_or_zero(INGEST_SHUTDOWN_TIMEOUT_MS_ENV)? {
                0 => crate::batcher::DEFAULT_SHUTDOWN_TIMEOUT,
                ms => Duration::from_millis(ms as u64),
            },
            delivery: delivery_from_env()?,
        }
        .normalized();

        let retention_days = match positive_or_zero(RETENTION_DAYS_ENV)? {
            0 => None,
            days => Some(u32::try_from(days).unwrap_or(u32::MAX)),
        };

        let format = match env_or(LOG_FORMAT_ENV, "text").to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidChoice {
                    key: LOG_FORMAT_ENV,
                    expected: "text, json",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            http_addr: listen_addr(HTTP_ADDR_ENV, DEFAULT_HTTP_ADDR)?,
            ingest_addr: listen_addr(GRPC_ADDR_ENV, DEFAULT_GRPC_ADDR)?,
            database_url: env_or(DATABASE_URL_ENV, DEFAULT_DATABASE_URL),
            batcher,
            retention_days,
            log: LogConfig {
                filter: env_or(LOG_LEVEL_ENV, "info"),
                format,
            },
        })
    }
}

/// Parse an integer variable; unset or non-positive yields 0.
fn positive_or_zero(key: &'static str) -> Result<usize, ConfigError> {
    let raw = env_or(key, "");
    if raw.is_empty() {
        return Ok(0);
    }
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidNumber { key, value: raw.clone() })?;
    Ok(usize::try_from(value).unwrap_or(0))
}

fn delivery_from_env() -> Result<DeliveryPolicy, ConfigError> {
    match env_or(INGEST_DELIVERY_ENV, "best-effort")
        .to_ascii_lowercase()
        .as_str()
    {
        "best-effort" | "best_effort" => Ok(DeliveryPolicy::BestEffort),
        "acknowledged" => {
            let retries = match env_or(INGEST_MAX_RETRIES_ENV, "").as_str() {
                "" => 3,
                _ => positive_or_zero(INGEST_MAX_RETRIES_ENV)?,
            };
            Ok(DeliveryPolicy::acknowledged(
                u32::try_from(retries).unwrap_or(u32::MAX),
            ))
        }
        other => Err(ConfigError::InvalidChoice {
            key: INGEST_DELIVERY_ENV,
            expected: "best-effort, acknowledged",
            value: other.to_string(),
        }),
    }
}

/// Accept `host:port` or the `:port` shorthand for all interfaces. The host
/// is not resolved here.
fn listen_addr(key: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env_or(key, default);
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.clone()
    };
    match full.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(full),
        _ => Err(ConfigError::InvalidAddr { key, value: raw }),
    }
}
