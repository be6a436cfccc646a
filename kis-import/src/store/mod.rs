//! KIS3 destination store
//!
//! Opens the SQLite pool, applies the bootstrap schema and exposes the generic
//! row readers and statement builders the import pipeline works through.

pub mod rows;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use rows::{insert_query, load_rows, push_value, update_query};

/// Pool settings for the destination database
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Open the destination database and bring its schema up to date
pub async fn connect(database_url: &str, options: &StoreOptions) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid destination database URL: {}", database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .acquire_timeout(options.acquire_timeout)
        .connect_with(connect_options)
        .await
        .with_context(|| format!("Failed to open destination database {}", database_url))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory destination (single connection, never recycled)
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("Invalid in-memory database URL")?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await
        .context("Failed to open in-memory database")?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Apply pending schema migrations
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    log::debug!("Applying destination schema migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to apply destination schema migrations")?;
    Ok(())
}
