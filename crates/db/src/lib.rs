pub mod clients;
pub mod people;
pub mod projects;
pub mod sync;

use atrium_common::error::{AtriumError, AtriumResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> AtriumResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| AtriumError::Database(e.to_string()))
}
