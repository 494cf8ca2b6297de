//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the harness proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener pair configuration (hostname, both ports).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Client runtime served on `/hammerhead.js`.
    pub client: ClientScriptConfig,
}

/// Listener pair configuration.
///
/// The two ports simulate distinct origins; proxy URLs generated for one
/// listener name the other one as the cross-domain port.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Hostname both listeners bind to and embed into proxy URLs.
    pub hostname: String,

    /// Port of the primary listener (`0` picks an ephemeral port).
    pub port1: u16,

    /// Port of the cross-domain listener (`0` picks an ephemeral port).
    pub port2: u16,

    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port1: 1836,
            port2: 1837,
            max_connections: 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a destination request to produce response headers, in milliseconds.
    pub destination_request_ms: u64,

    /// How long `Proxy::close` waits for in-flight connections, in milliseconds.
    pub drain_ms: u64,
}

impl TimeoutConfig {
    pub fn destination_request(&self) -> Duration {
        Duration::from_millis(self.destination_request_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            destination_request_ms: 25_000,
            drain_ms: 5_000,
        }
    }
}

/// Limits applied to buffered bodies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a buffered request or destination body in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Client runtime script settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientScriptConfig {
    /// Serve this file instead of the bundled client runtime.
    pub script_path: Option<String>,
}
