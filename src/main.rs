use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod middleware;
mod modules;
mod routes;
mod state;
mod workers;

use config::settings::AppConfig;
use infrastructure::db::pool::connect_to_db;
use infrastructure::queue::rabbitmq::RabbitMqService;
use infrastructure::redis::client::RedisService;
use infrastructure::storage::s3::StorageService;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new()?;
    for dir in [config.upload_dir(), config.work_dir(), config.public_video_dir.clone()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let db = connect_to_db(&config.database_url).await?;
    let redis = RedisService::new(&config.redis_url).await?;
    let storage = StorageService::new(
        &config.minio_url,
        &config.minio_bucket,
        &config.minio_region,
        &config.minio_access_key,
        &config.minio_secret_key,
        config.s3_upload_concurrency,
    );
    let queue = RabbitMqService::new(&config.rabbitmq_url).await?;

    let state = AppState::new(config.clone(), db, redis, storage, queue);

    tokio::spawn(workers::transcoder::start_transcoder_worker(state.clone()));

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
