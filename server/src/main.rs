use anyhow::Context;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eventhub_server::app::{Authorities, Storage};
use eventhub_server::config::Config;
use eventhub_server::routes::create_routes;
use eventhub_server::services::spawn_reconciler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    tracing::info!(role = %config.role, "Starting eventhub server");

    let storage = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Successfully connected to database");

            sqlx::migrate!()
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations run successfully");

            Storage::Postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using in-memory stores");
            Storage::Memory
        }
    };

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let authorities = Authorities::build(&config, &storage, http);

    if let Some(events) = &authorities.events {
        spawn_reconciler(events.clone(), config.reconcile_interval);
    }

    let app = create_routes(&authorities, &config.cors_allowed_origins);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
