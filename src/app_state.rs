use crate::auth::JwtService;
use crate::config::Config;
use crate::db::DbPool;
use crate::snowflake::IdGenerator;
use crate::storage::ObjectStorageClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub storage_client: ObjectStorageClient,
    pub ids: Arc<IdGenerator>,
    pub jwt: JwtService,
    pub config: Config,
}

impl AppState {
    pub fn new(
        db_pool: DbPool,
        storage_client: ObjectStorageClient,
        ids: IdGenerator,
        config: Config,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt_secret, config.jwt_expires_in_secs);
        Self {
            db_pool,
            storage_client,
            ids: Arc::new(ids),
            jwt,
            config,
        }
    }
}
