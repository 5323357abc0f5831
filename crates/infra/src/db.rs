//! Connection pool and schema migrations for the Postgres fact store.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run pending migrations from `crates/infra/migrations`.
///
/// sqlx tracks applied migrations in its `_sqlx_migrations` table.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("running fact store migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("fact store migrations completed");
    Ok(())
}
