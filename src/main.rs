use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::JobScheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idcard::assets::FsAssetStore;
use idcard::config::Config;
use idcard::db;
use idcard::holders::PgHolderSource;
use idcard::jobs::expiry_audit;
use idcard::services::allocator::IdentifierAllocator;
use idcard::services::card_registry::CardRegistry;
use idcard::services::renderer::{Branding, CardRenderer};
use idcard::store::{CardStore, PgCardStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idcard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ID card service...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(config.database_url.expose_secret(), config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Asset directories
    let assets = FsAssetStore::new(&config.upload_dir);
    tokio::fs::create_dir_all(assets.photo_dir()).await?;
    tokio::fs::create_dir_all(assets.artifact_dir()).await?;
    tracing::info!(upload_dir = %config.upload_dir, "Asset store ready");

    // Build the registry
    let store: Arc<dyn CardStore> = Arc::new(PgCardStore::new(pool.clone()));
    let renderer = CardRenderer::new(
        Branding {
            title: config.organization_title.clone(),
            subtitle: config.organization_subtitle.clone(),
        },
        Duration::from_secs(config.render_timeout_secs),
        config.render_concurrency,
    );
    let registry = CardRegistry::new(
        store.clone(),
        Arc::new(PgHolderSource::new(pool.clone())),
        Arc::new(assets),
        IdentifierAllocator::new(store.clone(), config.allocation_max_attempts),
        renderer,
    );

    let stats = registry.statistics().await?;
    tracing::info!(?stats, "Card registry initialized");

    // Schedule background jobs
    let mut scheduler = JobScheduler::new().await?;
    scheduler
        .add(expiry_audit::expiry_audit_job(
            &config.expiry_audit_schedule,
            store.clone(),
        )?)
        .await?;
    scheduler.start().await?;
    tracing::info!(schedule = %config.expiry_audit_schedule, "Expiry audit scheduled");

    shutdown_signal().await?;

    scheduler.shutdown().await?;
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, cleaning up...");
    Ok(())
}
