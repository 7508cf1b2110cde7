//! Shared application state

use crate::{
    config::Config,
    db::{self, PostgresResourceStore, PostgresVersionTracker, VersionTracker},
    services::{HistoryService, ResourceService},
    Result,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub resource_service: ResourceService,
    pub history_service: HistoryService,
    pub version_tracker: Option<Arc<dyn VersionTracker>>,
}

impl AppState {
    /// Connect to the database, run migrations and wire up the services.
    pub async fn new(config: Config) -> Result<Self> {
        let pool = db::connect(&config.database).await?;
        Ok(Self::from_pool(config, pool))
    }

    /// Wire the services over an existing pool. Migrations are not run.
    pub fn from_pool(config: Config, db_pool: PgPool) -> Self {
        let version_tracker: Option<Arc<dyn VersionTracker>> = if config.history.enabled {
            Some(Arc::new(PostgresVersionTracker::new(db_pool.clone())))
        } else {
            tracing::info!("Version history tracking disabled");
            None
        };

        let resource_service = ResourceService::new(
            PostgresResourceStore::new(db_pool.clone()),
            version_tracker.clone(),
        );
        let history_service = HistoryService::new(resource_service.clone());

        Self {
            config: Arc::new(config),
            db_pool,
            resource_service,
            history_service,
            version_tracker,
        }
    }
}
