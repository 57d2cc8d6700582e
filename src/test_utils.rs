//! Fixtures shared by unit and integration tests.

use crate::app_state::AppState;
use crate::config::Config;
use crate::db::{create_lazy_pool, create_pool, run_migrations, DbPool};
use crate::snowflake::IdGenerator;
use crate::storage::ObjectStorageClient;
use diesel::prelude::*;

pub const TEST_JWT_SECRET: &str = "perch-test-secret";

pub fn create_test_config() -> Config {
    Config {
        database_url: std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/perch_test".to_string()),
        host: "127.0.0.1".to_string(),
        port: 0,
        storage_base_url: "http://127.0.0.1:9".to_string(),
        storage_bucket: "test-bucket".to_string(),
        media_base_url: "https://media.test".to_string(),
        max_image_size_bytes: 1024 * 1024,
        allowed_image_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expires_in_secs: 3600,
        worker_id: 1,
        datacenter_id: 1,
    }
}

fn build_state(config: Config, db_pool: DbPool) -> AppState {
    let storage_client = ObjectStorageClient::new(
        config.storage_base_url.clone(),
        config.storage_bucket.clone(),
        config.media_base_url.clone(),
    );
    let ids = IdGenerator::new(config.worker_id, config.datacenter_id)
        .expect("valid test worker/datacenter ids");
    AppState::new(db_pool, storage_client, ids, config)
}

/// State whose pool never connects until asked. For exercising paths that fail before any
/// database access.
pub fn create_offline_app_state() -> AppState {
    let config = create_test_config();
    let pool = create_lazy_pool(&config.database_url);
    build_state(config, pool)
}

/// State backed by the database at `TEST_DATABASE_URL`, with migrations applied. `None` when the
/// variable is unset so database tests can skip themselves.
pub fn create_test_app_state(storage_base_url: Option<String>) -> Option<AppState> {
    std::env::var("TEST_DATABASE_URL").ok()?;

    let mut config = create_test_config();
    if let Some(url) = storage_base_url {
        config.storage_base_url = url;
    }

    let pool = create_pool(&config.database_url).expect("Failed to create test pool");
    let mut conn = pool.get().expect("Failed to get connection");
    run_migrations(&mut conn).expect("Failed to run migrations");

    Some(build_state(config, pool))
}

pub fn cleanup_test_db(pool: &DbPool) {
    let mut conn = pool.get().expect("Failed to get connection");

    diesel::sql_query("TRUNCATE TABLE follows, likes, comments, tweets, users CASCADE")
        .execute(&mut conn)
        .ok();
}
