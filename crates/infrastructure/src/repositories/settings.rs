//! SQLite implementation of the settings store

use async_trait::async_trait;
use chrono::Utc;
use felarr_core::{FelarrError, Result, SettingsStore, UpgradePolicy};
use sqlx::Row;

use crate::database::DatabasePool;

const POLICY_KEY: &str = "upgrade_policy";

pub struct SqliteSettingsRepository {
    pool: DatabasePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsRepository {
    async fn load_policy(&self) -> Result<Option<UpgradePolicy>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(POLICY_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(FelarrError::store)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("value").map_err(FelarrError::store)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(FelarrError::store)
    }

    async fn save_policy(&self, policy: &UpgradePolicy) -> Result<()> {
        let value = serde_json::to_string(policy).map_err(FelarrError::store)?;
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
        )
        .bind(POLICY_KEY)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(FelarrError::store)?;
        Ok(())
    }
}
