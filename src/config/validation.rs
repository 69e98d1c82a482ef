//! Configuration validation.
//!
//! Serde handles syntax; this checks values. All problems are reported at
//! once rather than stopping at the first.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.addresses.is_empty() {
        errors.push(ValidationError::new("listener.addresses", "at least one address is required"));
    }
    for (i, address) in config.listener.addresses.iter().enumerate() {
        let valid_port = address
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        if !valid_port {
            errors.push(ValidationError::new(
                format!("listener.addresses[{}]", i),
                format!("'{}' is not a host:port pair", address),
            ));
        }
    }
    if config.listener.keepalive_secs == 0 {
        errors.push(ValidationError::new("listener.keepalive_secs", "must be greater than 0"));
    }

    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::new("http.max_body_bytes", "must be greater than 0"));
    }
    if config.http.default_batch == 0 {
        errors.push(ValidationError::new("http.default_batch", "must be greater than 0"));
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, table) in config.store.tables.iter().enumerate() {
        let field = format!("store.tables[{}]", i);
        if table.name.is_empty() {
            errors.push(ValidationError::new(&field, "table name is empty"));
        } else if !seen.insert(table.name.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate table '{}'", table.name)));
        }
        if table.families.is_empty() {
            errors.push(ValidationError::new(&field, "at least one column family is required"));
        }
        if table.families.iter().any(|f| f.is_empty() || f.contains(':')) {
            errors.push(ValidationError::new(&field, "family names must be non-empty and contain no ':'"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if config.runtime.worker_threads == Some(0) {
        errors.push(ValidationError::new("runtime.worker_threads", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
