use evgate_core::config::PostgresConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

/// Create a PostgreSQL connection pool and run migrations.
/// Returns None when Postgres is not configured or unreachable; callers then
/// fall back to in-memory stores.
pub async fn init_pg_pool(config: &PostgresConfig) -> Option<PgPool> {
    if !config.is_configured() {
        warn!("PG_USERNAME not configured; using in-memory job and registry stores");
        return None;
    }

    let pool = match PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            warn!(host = %config.host, error = %e, "failed to connect to PostgreSQL; using in-memory stores");
            return None;
        }
    };
    info!(host = %config.host, database = %config.database, "PostgreSQL connected");

    match sqlx::migrate!("../../migrations").run(&pool).await {
        Ok(()) => {
            info!("database migrations applied");
            Some(pool)
        }
        Err(e) => {
            warn!(error = %e, "failed to run migrations; using in-memory stores");
            None
        }
    }
}
