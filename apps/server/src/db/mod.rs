//! Database layer - repositories and data access

pub mod history;
pub mod search;
pub mod store;
pub mod traits;

pub use history::PostgresVersionTracker;
pub use store::PostgresResourceStore;
pub use traits::VersionTracker;

use crate::{config::DatabaseConfig, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::{str::FromStr, time::Duration};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(&config.url)?.options([
        (
            "statement_timeout",
            format!("{}s", config.statement_timeout_seconds),
        ),
        ("lock_timeout", format!("{}s", config.lock_timeout_seconds)),
    ]);
    Ok(options)
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
}

/// Connect the pool and, when configured, apply embedded migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = pool_options(config)
        .connect_with(connect_options(config)?)
        .await?;

    if config.run_migrations {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| crate::Error::Internal(format!("Migration failed: {}", e)))?;
        tracing::info!("Database migrations applied");
    }

    Ok(pool)
}

/// Pool that opens connections on first use.
pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool> {
    Ok(pool_options(config).connect_lazy_with(connect_options(config)?))
}
