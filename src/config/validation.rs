//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity, deadline)
//! - Check addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: GateConfig → Result<(), Vec<ValidationError>>

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::{max_handshakes_limit, GateConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listener = &config.listener;

    if listener.bind_host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_host",
            format!("'{}' is not an IP address", listener.bind_host),
        ));
    }

    if listener.max_handshakes == 0 {
        errors.push(ValidationError::new("listener.max_handshakes", "must be at least 1"));
    } else if listener.max_handshakes > max_handshakes_limit() {
        errors.push(ValidationError::new(
            "listener.max_handshakes",
            format!("must not exceed {}", max_handshakes_limit()),
        ));
    }

    if listener.handshake_timeout_ms == 0 {
        errors.push(ValidationError::new("listener.handshake_timeout_ms", "must be greater than 0"));
    }

    if let Some(path) = &config.identity.key_path {
        if path.trim().is_empty() {
            errors.push(ValidationError::new("identity.key_path", "must not be empty when set"));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GateConfig::default();
        config.listener.bind_host = "not-an-ip".into();
        config.listener.max_handshakes = 0;
        config.listener.handshake_timeout_ms = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_host",
                "listener.max_handshakes",
                "listener.handshake_timeout_ms",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn metrics_address_ignored_when_disabled() {
        let mut config = GateConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn capacity_upper_bound() {
        let mut config = GateConfig::default();
        config.listener.max_handshakes = max_handshakes_limit() + 1;
        assert!(validate_config(&config).is_err());
    }
}
