//! Startup orchestration.
//!
//! Config is validated before anything binds; metrics come up before the
//! listeners so the first request is already counted. Any startup error
//! is fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::error::ProxyError;
use crate::http::Proxy;
use crate::lifecycle::signals::wait_for_signal;
use crate::observability::metrics;
use crate::session::BasicSession;

/// Run the proxy until SIGINT/SIGTERM.
///
/// With `open_url`, a [`BasicSession`] is opened for it and its proxy URL
/// is printed to stdout.
pub async fn run(config: ProxyConfig, open_url: Option<String>) -> Result<(), ProxyError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let proxy = Proxy::start(&config).await?;

    if let Some(url) = open_url {
        let session = Arc::new(BasicSession::new(uuid::Uuid::new_v4().simple().to_string()));
        let proxy_url = proxy.open_session(&url, session);
        println!("{}", proxy_url);
    }

    wait_for_signal().await;
    proxy.close().await;
    Ok(())
}
