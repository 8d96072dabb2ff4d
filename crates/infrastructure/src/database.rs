//! Database connection and configuration
//!
//! One SQLite file in WAL mode; a small pool is plenty for a single
//! operator. Migrations are embedded and applied at startup.

use std::str::FromStr;
use std::time::Duration;

use felarr_core::{FelarrError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://felarr.db".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://felarr.db".to_string()),
            ..Self::default()
        }
    }
}

pub type DatabasePool = Pool<Sqlite>;

/// Open the pool, creating the database file when missing.
pub async fn create_pool(config: DatabaseConfig) -> Result<DatabasePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(FelarrError::store)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(FelarrError::store)?;

    Ok(pool)
}

/// Apply embedded migrations.
pub async fn migrate(pool: &DatabasePool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(FelarrError::store)?;
    Ok(())
}

/// Fresh in-memory database with the full schema; test helper.
pub async fn memory_pool() -> DatabasePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory connect options")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("connect in-memory sqlite");
    migrate(&pool).await.expect("run migrations");
    pool
}
