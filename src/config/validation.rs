//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is reported,
//! not just the first one.

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.hostname.trim().is_empty() {
        errors.push(ValidationError {
            field: "listener.hostname",
            message: "must not be empty".to_string(),
        });
    }

    // Two ephemeral ports are fine, two identical fixed ports are not.
    if config.listener.port1 != 0 && config.listener.port1 == config.listener.port2 {
        errors.push(ValidationError {
            field: "listener.port2",
            message: format!("must differ from port1 ({})", config.listener.port1),
        });
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError {
            field: "listener.max_connections",
            message: "must be greater than zero".to_string(),
        });
    }

    if config.timeouts.destination_request_ms == 0 {
        errors.push(ValidationError {
            field: "timeouts.destination_request_ms",
            message: "must be greater than zero".to_string(),
        });
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError {
            field: "limits.max_body_size",
            message: "must be greater than zero".to_string(),
        });
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
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = ProxyConfig::default();
        config.listener.port2 = config.listener.port1;
        config.timeouts.destination_request_ms = 0;
        config.listener.hostname = " ".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.hostname", "listener.port2", "timeouts.destination_request_ms"]
        );
    }

    #[test]
    fn test_two_ephemeral_ports_allowed() {
        let mut config = ProxyConfig::default();
        config.listener.port1 = 0;
        config.listener.port2 = 0;
        assert!(validate_config(&config).is_ok());
    }
}
