use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use linkhub::analytics::{Aggregator, GeoService};
use linkhub::api::{self, AppState};
use linkhub::config::{Config, DatabaseBackend};
use linkhub::storage::{CachedStorage, PostgresStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let backend: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
    };

    info!("Initializing database...");
    backend.init().await?;
    info!("Database initialized successfully");

    // Link registry reads go through the cache; counters do not
    let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(
        backend,
        config.cache.max_entries,
        config.cache.ttl_secs,
    ));

    let geo = Arc::new(GeoService::new(
        &config.analytics.geo_base_url,
        config.analytics.geo_timeout_ms,
    )?);
    info!(
        "Geolocation provider: {} (timeout {}ms)",
        config.analytics.geo_base_url, config.analytics.geo_timeout_ms
    );

    let aggregator = Aggregator::new(Arc::clone(&storage));

    let state = Arc::new(AppState {
        storage,
        aggregator,
        geo,
        analytics: config.analytics.clone(),
    });
    let router = api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
