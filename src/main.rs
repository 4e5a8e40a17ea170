//! QuickAttendance Server
//!
//! REST API for agency work schedules and daily attendance.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quickattendance_server::{
    api,
    config::AppConfig,
    repository::{memory::MemoryDatabase, Database, Repository},
    services::{clock::SystemClock, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("quickattendance_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting QuickAttendance Server v{}", env!("CARGO_PKG_VERSION"));

    let db: Arc<dyn Database> = if config.database.is_memory() {
        tracing::warn!("Using in-memory storage, data is lost on shutdown");
        Arc::new(MemoryDatabase::new())
    } else {
        let repository = Repository::connect(&config.database)
            .await
            .context("Failed to connect to database")?;
        tracing::info!("Connected to database");

        sqlx::migrate!("./migrations")
            .run(&repository.pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations completed");

        Arc::new(repository)
    };

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let services = Services::new(db, Arc::new(SystemClock));
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
