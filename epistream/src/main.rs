mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use epistream_api::AppState;
use epistream_core::{
    bootstrap::{init_services, load_config},
    logging, MetricsSink, PrometheusMetrics,
};
use epistream_proxy::StreamProxy;

use server::EpistreamServer;

#[derive(Parser, Debug)]
#[command(name = "epistream")]
#[command(about = "Episode source resolver and stream proxy", long_about = None)]
struct Args {
    /// Path to a YAML/TOML config file
    #[arg(long, short, env = "EPISTREAM_CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Epistream starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize services
    let metrics: Arc<dyn MetricsSink> = Arc::new(PrometheusMetrics);
    let services = init_services(&config, Arc::clone(&metrics)).await?;

    // 4. Stream proxy
    let proxy = StreamProxy::new(&config.proxy, metrics)?;
    info!(
        public_path = %config.proxy.public_path,
        rewrite_manifests = config.proxy.rewrite_manifests,
        "Stream proxy initialized"
    );

    let state = AppState {
        resolver: services.resolver,
        aggregator: services.aggregator,
        proxy,
        proxy_path: config.proxy.public_path.clone(),
        cors_origin: config.proxy.cors_origin.clone(),
        debug_errors: config.server.debug_errors,
    };

    // 5. Serve until shutdown
    EpistreamServer::new(config, state).start().await
}
