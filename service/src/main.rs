//! Tasa rate daemon.
//!
//! Loads the pair graph and runs derivation on a fixed interval until Ctrl+C.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasa_graph::{PairGraph, PairsFile};
use tasa_quote::{P2pMarketClient, QuoteSource};
use tasa_service::{quote_requests, RateService, ServiceConfig};
use tasa_store::{InMemoryRateStore, RateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Tasa rate service");

    let config = ServiceConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let graph = PairGraph::from_seed(PairsFile::load(&config.pairs_file)?)?;
    info!(
        pairs_file = %config.pairs_file.display(),
        pairs = graph.len(),
        "Pair graph loaded"
    );

    let store = open_store(&config).await?;
    let client = P2pMarketClient::new(config.market.client_config())?;
    if config.market.validate_tracking {
        check_tracking(&client, &graph).await;
    }
    let source: Arc<dyn QuoteSource> = Arc::new(client);
    let service = Arc::new(RateService::new(&config, graph, store, source)?);

    let service_clone = service.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C; stopping"),
        }
        service_clone.stop();
    });

    service.run_loop().await;

    info!(metrics = ?service.metrics().snapshot(), "Tasa rate service shutdown complete");
    Ok(())
}

/// Log tracked pairs whose filters find no adverts. Never fatal.
async fn check_tracking(client: &P2pMarketClient, graph: &PairGraph) {
    for request in quote_requests(graph) {
        match client.validate_tracking(&request).await {
            Ok(validation) if !validation.is_valid() => {
                warn!(query = %request.key, filters = ?validation.invalid_filters, "No filter has tradable adverts")
            }
            Ok(validation) if !validation.invalid_filters.is_empty() => {
                warn!(query = %request.key, filters = ?validation.invalid_filters, "Some filters have no tradable adverts")
            }
            Ok(_) => info!(query = %request.key, "Tracking filters valid"),
            Err(e) => warn!(query = %request.key, error = %e, "Tracking check failed"),
        }
    }
}

#[cfg(feature = "postgres")]
async fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn RateStore>> {
    match &config.store.database_url {
        Some(url) => {
            let store = tasa_store::PgRateStore::connect(url, config.store.max_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL unset; using in-memory rate store");
            Ok(Arc::new(InMemoryRateStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn RateStore>> {
    if config.store.database_url.is_some() {
        anyhow::bail!("DATABASE_URL is set but tasad was built without the postgres feature");
    }
    info!("Using in-memory rate store");
    Ok(Arc::new(InMemoryRateStore::new()))
}
