//! Citadel - cache service for a guild-management bot.
//!
//! Connects to MongoDB, preloads every shared category into the cache and
//! keeps it maintained until shutdown.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use citadel::cache::{CacheContext, HealthStatus};
use citadel::config::Config;
use citadel::database::Database;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("citadel=info,mongodb=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting Citadel...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    // Connect to MongoDB
    info!("Connecting to MongoDB...");
    let db = Database::connect(&config.mongodb_uri, &config.mongodb_database).await?;
    let db = Arc::new(db);
    info!("Database connected");

    let ctx = CacheContext::new(db, config.cache);
    let maintenance = ctx.spawn_maintenance();

    let report = ctx.loader.load_all_shared_data().await;
    if report.is_partial() {
        warn!("Categories left unloaded: {:?}", report.failed.keys().collect::<Vec<_>>());
    }

    let health = ctx.cache.health_check();
    match health.status {
        HealthStatus::Healthy => info!("Cache healthy: {} entries", health.metrics.total_entries),
        _ => warn!("Cache {:?}: {}", health.status, health.issues.join("; ")),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    maintenance.abort();

    Ok(())
}
