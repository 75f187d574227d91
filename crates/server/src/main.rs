use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wicket_core::{
    chain::{LagConfig, LagEngine},
    config::AppConfig,
    metrics::Counters,
    proxy::{ProxyEngine, SharedContext},
    upstream::{HttpClient, NodeRouter},
};

mod router;

const STATISTICS_LOG_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Initializes the logging system based on the configuration.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,wicket_core={0},wicket={0}", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        // "pretty" and any other format default to pretty logging
        registry.with(tracing_subscriber::fmt::layer().pretty().with_target(false)).init();
    }
}

/// Container for the initialized core services.
struct CoreServices {
    engine: Arc<ProxyEngine>,
    lag_engine: LagEngine,
    counters: Arc<Counters>,
}

fn init_core_services(config: &AppConfig) -> Result<CoreServices> {
    let transport = Arc::new(
        HttpClient::new().map_err(|e| anyhow::anyhow!("HTTP client initialization failed: {e}"))?,
    );

    let node_router = Arc::new(
        NodeRouter::new(
            config.nodes.main_urls.clone(),
            config.nodes.fallback_urls.clone(),
            transport,
        )
        .map_err(|e| anyhow::anyhow!("node router initialization failed: {e}"))?,
    );

    info!(main_nodes = config.nodes.main_urls.len(), "node router initialized");
    for url in &config.nodes.main_urls {
        info!(node = %url, "using main RPC node");
    }
    if config.nodes.fallback_urls.is_empty() {
        warn!("no fallback RPC node specified");
    } else {
        for url in &config.nodes.fallback_urls {
            info!(node = %url, "using fallback RPC node");
        }
    }

    let counters = Arc::new(Counters::new());
    let ctx = SharedContext::new(node_router, counters.clone());

    let lag_engine = LagEngine::new(
        ctx.clone(),
        LagConfig {
            block_delay: config.chain.block_delay,
            block_max_gap: config.chain.block_max_gap,
            ..LagConfig::default()
        },
    );

    Ok(CoreServices { engine: Arc::new(ProxyEngine::new(ctx)), lag_engine, counters })
}

async fn shutdown_signal() {
    if let Err(error) = signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    init_logging(&config);

    let services = init_core_services(&config)?;

    // Initialization, refill, and the steady-state head poll all run inside
    // the lag engine's own loop; requests fail fast with
    // initialization-pending until the first refill completes.
    let lag_engine = services.lag_engine;
    tokio::spawn(async move { lag_engine.run().await });

    let counters = services.counters;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(STATISTICS_LOG_INTERVAL).await;
            info!("\n{}", counters.snapshot().render_table());
        }
    });

    let app = router::build(services.engine);
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.bind_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("server stopped");
    Ok(())
}
