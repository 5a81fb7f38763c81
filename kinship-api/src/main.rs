//! # Kinship API Server
//!
//! ```bash
//! STORAGE_BACKEND=memory JWT_SECRET=... cargo run -p kinship-api
//! ```

use std::sync::Arc;

use kinship_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat, StorageBackend},
};
use kinship_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, PoolSettings},
    },
    store::{MemoryStore, PgStore, Store},
};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "kinship_api=debug,kinship_shared=debug,tower_http=debug";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        "Kinship API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let (store, pool): (Arc<dyn Store>, Option<PgPool>) = match config.storage.backend {
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;

            let pool = create_pool(PoolSettings {
                url,
                max_connections: config.storage.max_connections,
                ..Default::default()
            })
            .await?;
            run_migrations(&pool).await?;

            (Arc::new(PgStore::new(pool.clone())), Some(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on exit");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let address = config.bind_address();
    let app = build_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        close_pool(&pool).await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
