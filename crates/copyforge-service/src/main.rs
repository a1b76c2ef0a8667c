//! Copyforge Service - credit-metered social post generation.
//!
//! This is the main entry point for the copyforge service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use copyforge_service::config::StoreBackend;
use copyforge_service::state::build_selector;
use copyforge_service::{create_router, AppState, ServiceConfig};
use copyforge_store::{LedgerStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,copyforge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Copyforge Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        store_backend = ?config.store_backend,
        upstage_configured = %config.providers.upstage.is_some(),
        mistral_configured = %config.providers.mistral.is_some(),
        ollama_configured = %config.providers.ollama.is_some(),
        generate_cost = config.pricing.generate_content,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;
    let selector = build_selector(&config.providers);

    let state = AppState::new(store, selector, config.clone())?;

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn open_store(config: &ServiceConfig) -> Result<Arc<dyn LedgerStore>, Box<dyn std::error::Error>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store - balances are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb-backend")]
        StoreBackend::RocksDb => {
            tracing::info!(path = %config.data_dir, "Opening RocksDB store");
            Ok(Arc::new(copyforge_store::RocksStore::open(&config.data_dir)?))
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StoreBackend::RocksDb => {
            Err("built without the rocksdb-backend feature; set STORE_BACKEND=memory".into())
        }
    }
}
