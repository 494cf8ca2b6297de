//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::ListenerError;

/// Failure to start or run the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Invalid service route: {0}")]
    Route(#[from] regex::Error),

    #[error("Failed to read client script {path}: {source}")]
    ClientScript {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics exporter failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
