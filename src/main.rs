use perch::app_state::AppState;
use perch::config::Config;
use perch::db;
use perch::routes;
use perch::snowflake::IdGenerator;
use perch::storage::ObjectStorageClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db_pool = db::create_pool(&config.database_url)?;

    let mut conn = db_pool.get()?;
    db::run_migrations(&mut conn)?;
    drop(conn);
    tracing::info!("Database migrations completed");

    let ids = IdGenerator::new(config.worker_id, config.datacenter_id)?;

    let storage_client = ObjectStorageClient::new(
        config.storage_base_url.clone(),
        config.storage_bucket.clone(),
        config.media_base_url.clone(),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(db_pool, storage_client, ids, config);
    let app = routes::build_router(state);

    tracing::info!("Starting API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
