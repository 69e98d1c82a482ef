//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind addresses, keep-alive).
    pub listener: ListenerConfig,

    /// Request handling settings.
    pub http: HttpConfig,

    /// Store backend settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Runtime tuning.
    pub runtime: RuntimeConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Addresses to accept connections on (e.g., "0.0.0.0:8080").
    pub addresses: Vec<String>,

    /// TCP keep-alive period for accepted connections, in seconds.
    pub keepalive_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["0.0.0.0:8080".to_string()],
            keepalive_secs: 15,
        }
    }
}

/// Request handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Largest accepted PUT body in bytes.
    pub max_body_bytes: usize,

    /// Total time allowed per request, in seconds.
    pub request_timeout_secs: u64,

    /// Rows returned by a range read when `batch` is absent or invalid.
    pub default_batch: usize,

    /// Surface failed writes/deletes as 503 instead of logging them.
    pub strict_write_ack: bool,

    /// How long in-flight connections may run after shutdown, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            request_timeout_secs: 30,
            default_batch: crate::store::DEFAULT_BATCH,
            strict_write_ack: false,
            drain_timeout_secs: 10,
        }
    }
}

/// Which store client to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Tables created when the gateway starts.
    pub tables: Vec<TableConfig>,
}

/// A table and its column families.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    pub name: String,
    pub families: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Access log file, opened in append mode. Stdout when unset.
    pub access_log: Option<PathBuf>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            access_log: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker thread count for the async runtime; Tokio's default when unset.
    pub worker_threads: Option<usize>,
}
