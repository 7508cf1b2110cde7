use anyhow::Context as _;
use ehr_server::Config;
use std::sync::Arc;
use tokio::sync::OnceCell;

static SHARED: OnceCell<Arc<SharedTestResources>> = OnceCell::const_new();

pub struct SharedTestResources {
    pub base_config: Config,
    /// `None` when no test database is configured.
    pub database_url: Option<String>,
}

pub async fn shared() -> anyhow::Result<Arc<SharedTestResources>> {
    SHARED
        .get_or_try_init(|| async {
            init_tracing();

            let mut config = Config::load().context("load Config for tests")?;
            let database_url = std::env::var("EHR_TEST_DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .or_else(|| config.database.test_database_url.clone());

            // Keep tests deterministic: no external base URL, migrations per schema.
            config.fhir.base_url = None;
            config.history.enabled = true;
            config.history.retention_days = None;
            config.database.run_migrations = true;
            config.database.pool_min_size = 0;

            Ok(Arc::new(SharedTestResources {
                base_config: config,
                database_url,
            }))
        })
        .await
        .cloned()
}

fn init_tracing() {
    use std::sync::OnceLock;
    use tracing_subscriber::prelude::*;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "ehr_server=info,sqlx=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
