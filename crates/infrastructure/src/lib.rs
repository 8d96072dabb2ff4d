//! Persistence and Radarr integration
//!
//! SQLite (via sqlx) implementations of the core store traits, plus the
//! Radarr v3 API client that resolves on-disk movie folders.

pub mod database;
pub mod radarr;
pub mod repositories;

pub use database::{create_pool, DatabaseConfig, DatabasePool};
pub use radarr::{RadarrClient, RadarrConfig};
pub use repositories::{
    SqliteCapabilityRepository, SqliteHistoryRepository, SqlitePendingRepository,
    SqliteSettingsRepository,
};
