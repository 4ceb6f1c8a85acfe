use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::cache::{RedisConfig, RedisPool};
use common::database::{DatabaseConfig, init_pool};
use parking::{
    AllocationService, AppState,
    cache::AvailabilityCache,
    clock::SystemClock,
    config::{ParkingConfig, StorageBackend},
    routes,
    store::{MemoryStore, ParkingStore, PgStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting parking service");

    let config = ParkingConfig::load()?;
    info!(
        "Loaded configuration: storage {:?}, rate {} per hour, {} configured slots",
        config.storage,
        config.rate_per_hour,
        config.layout.iter().map(|l| l.total()).sum::<u32>()
    );

    let cache = match RedisConfig::from_env() {
        Some(redis_config) => {
            let pool = RedisPool::new(&redis_config)?;
            if pool.health_check().await.unwrap_or(false) {
                info!("Availability cache enabled");
                Some(AvailabilityCache::new(
                    pool,
                    config.snapshot_cache_ttl_seconds,
                ))
            } else {
                warn!("Redis is unreachable, serving availability without cache");
                None
            }
        }
        None => None,
    };

    match config.storage {
        StorageBackend::Memory => {
            info!("Using in-memory store");
            serve(MemoryStore::new(), &config, cache).await
        }
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            // Check database connectivity
            if common::database::health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            let store = PgStore::new(pool);
            store.migrate().await?;
            serve(store, &config, cache).await
        }
    }
}

async fn serve<S: ParkingStore + 'static>(
    store: S,
    config: &ParkingConfig,
    cache: Option<AvailabilityCache>,
) -> Result<()> {
    let service = AllocationService::new(store, Arc::new(SystemClock), config.service_settings());
    service.seed_layout(&config.layout).await?;

    let app = routes::create_router(AppState::new(service, cache));

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Parking service listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
