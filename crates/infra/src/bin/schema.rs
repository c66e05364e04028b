//! Applies the orderdesk schema to the database named by `DATABASE_URL`.

use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use orderdesk_infra::config::AppConfig;
use orderdesk_infra::store::PostgresStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    orderdesk_observability::init_with(&config.log_filter, config.log_format);

    let database_url = config.require_database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .context("failed to connect to postgres")?;

    let store = PostgresStore::new(pool).with_lock_timeout(config.lock_timeout);
    store.apply_schema().await.context("failed to apply schema")?;

    tracing::info!("orderdesk schema is up to date");
    Ok(())
}
