use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;

pub mod metadata;
pub mod models;

/// Creates a Postgres connection pool and runs pending migrations.
///
/// Mirrors the teacher's SQLite `create_pool`: per-connection options are
/// built explicitly (here from discrete `POSTGRES_*` fields rather than a
/// single DSN string) and migrations are embedded at compile time via
/// `sqlx::migrate!` so the binary is self-contained.
pub async fn create_pool(dsn: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let connect_options = PgConnectOptions::from_str(dsn)?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
