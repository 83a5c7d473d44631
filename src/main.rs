//! Schoolgate - login security pipeline for the school portal

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use schoolgate::{
    api::{self, AppState},
    config::Config,
    db,
    services::TracingSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schoolgate=info,security=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting schoolgate...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.validate()?;
    tracing::info!("Configuration loaded ({:?})", config.environment);

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let sweep_interval = config.retention.sweep_interval_secs;

    let state = AppState::build(config, pool.clone(), Arc::new(TracingSink))?;

    // In-process retention sweep, alongside the cron endpoint
    if let Some(secs) = sweep_interval.filter(|secs| *secs > 0) {
        let sweeper = state.sweeper.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            loop {
                interval.tick().await;
                if let Err(e) = sweeper.sweep().await {
                    tracing::error!("Scheduled retention sweep failed: {:#}", e);
                }
            }
        });
        tracing::info!("Retention sweep scheduled every {}s", secs);
    }

    // Build router
    let app = api::build_router(state)?;

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    pool.close().await;
    Ok(())
}
