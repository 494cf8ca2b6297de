use clap::Parser;
use std::path::PathBuf;

use harness_proxy::config::{load_config, ProxyConfig};
use harness_proxy::lifecycle::startup;
use harness_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "harness-proxy")]
#[command(about = "URL-rewriting proxy for browser test harnesses", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    hostname: Option<String>,

    /// Primary listener port
    #[arg(long)]
    port1: Option<u16>,

    /// Cross-domain listener port
    #[arg(long)]
    port2: Option<u16>,

    /// Open a session for this URL and print its proxy URL
    #[arg(long, value_name = "URL")]
    open: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(hostname) = cli.hostname {
        config.listener.hostname = hostname;
    }
    if let Some(port) = cli.port1 {
        config.listener.port1 = port;
    }
    if let Some(port) = cli.port2 {
        config.listener.port2 = port;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "harness-proxy starting");

    startup::run(config, cli.open).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
