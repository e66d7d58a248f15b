//! `bap-server` binary entry point: initialize logging, load configuration
//! from the environment, and run the WebSocket server until killed.

use bap_server::config::Config;
use bap_server::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    let config = Config::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        require_tls = config.require_tls,
        "starting bap-server"
    );

    server::run(config).await
}
