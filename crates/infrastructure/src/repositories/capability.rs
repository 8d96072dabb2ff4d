//! SQLite implementation of the capability store

use async_trait::async_trait;
use chrono::Utc;
use felarr_core::{
    CapabilityPredicate, CapabilityRecord, CapabilityStore, FelarrError, Result,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::database::DatabasePool;

const RECORD_COLUMNS: &str = "rating_key, title, year, dv_profile, dv_fel, has_atmos, \
                              file_size, video_bitrate, audio_tracks, last_updated, extra_data";

pub struct SqliteCapabilityRepository {
    pool: DatabasePool,
}

impl SqliteCapabilityRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn parse_record(row: &SqliteRow) -> Result<CapabilityRecord> {
        let extra: Option<String> = row.try_get("extra_data").map_err(FelarrError::store)?;
        let extra = extra
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| serde_json::json!({}));

        Ok(CapabilityRecord {
            rating_key: row.try_get("rating_key").map_err(FelarrError::store)?,
            title: row.try_get("title").map_err(FelarrError::store)?,
            year: row.try_get("year").map_err(FelarrError::store)?,
            dv_profile: row.try_get("dv_profile").map_err(FelarrError::store)?,
            dv_fel: row.try_get("dv_fel").map_err(FelarrError::store)?,
            has_atmos: row.try_get("has_atmos").map_err(FelarrError::store)?,
            file_size: row.try_get("file_size").map_err(FelarrError::store)?,
            video_bitrate: row.try_get("video_bitrate").map_err(FelarrError::store)?,
            audio_tracks: row.try_get("audio_tracks").map_err(FelarrError::store)?,
            last_updated: row.try_get("last_updated").map_err(FelarrError::store)?,
            extra,
        })
    }
}

#[async_trait]
impl CapabilityStore for SqliteCapabilityRepository {
    async fn upsert_capability(&self, record: &CapabilityRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(FelarrError::store)?;

        let existing = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM movies WHERE rating_key = ?"
        ))
        .bind(&record.rating_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(FelarrError::store)?;

        let existing = existing.as_ref().map(Self::parse_record).transpose()?;

        if let Some(existing) = &existing {
            if existing.same_capabilities(record) {
                // identical payload; keep the stored timestamp untouched
                tx.commit().await.map_err(FelarrError::store)?;
                return Ok(());
            }
        }

        // last_updated is monotone per key even if the wall clock steps back
        let now = Utc::now();
        let last_updated = match &existing {
            Some(existing) if existing.last_updated > now => existing.last_updated,
            _ => now,
        };

        let extra = serde_json::to_string(&record.extra).map_err(FelarrError::store)?;

        sqlx::query(
            "INSERT INTO movies (rating_key, title, year, dv_profile, dv_fel, has_atmos,
                                 file_size, video_bitrate, audio_tracks, last_updated, extra_data)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(rating_key) DO UPDATE SET
                 title = excluded.title,
                 year = excluded.year,
                 dv_profile = excluded.dv_profile,
                 dv_fel = excluded.dv_fel,
                 has_atmos = excluded.has_atmos,
                 file_size = excluded.file_size,
                 video_bitrate = excluded.video_bitrate,
                 audio_tracks = excluded.audio_tracks,
                 last_updated = excluded.last_updated,
                 extra_data = excluded.extra_data",
        )
        .bind(&record.rating_key)
        .bind(&record.title)
        .bind(record.year)
        .bind(&record.dv_profile)
        .bind(record.dv_fel)
        .bind(record.has_atmos)
        .bind(record.file_size)
        .bind(record.video_bitrate)
        .bind(&record.audio_tracks)
        .bind(last_updated)
        .bind(extra)
        .execute(&mut *tx)
        .await
        .map_err(FelarrError::store)?;

        tx.commit().await.map_err(FelarrError::store)?;
        Ok(())
    }

    async fn get_by_key(&self, rating_key: &str) -> Result<Option<CapabilityRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM movies WHERE rating_key = ?"
        ))
        .bind(rating_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        row.as_ref().map(Self::parse_record).transpose()
    }

    async fn get_all(&self) -> Result<Vec<CapabilityRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM movies ORDER BY title"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        rows.iter().map(Self::parse_record).collect()
    }

    async fn get_where(&self, predicate: CapabilityPredicate) -> Result<Vec<CapabilityRecord>> {
        let condition = match predicate {
            CapabilityPredicate::HasDv => "dv_profile IS NOT NULL AND dv_profile != 'None'",
            CapabilityPredicate::HasP7Fel => "dv_profile = '7' AND dv_fel = 1",
            CapabilityPredicate::HasAtmos => "has_atmos = 1",
        };

        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM movies WHERE {condition}"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        rows.iter().map(Self::parse_record).collect()
    }

    async fn find_by_title(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<CapabilityRecord>> {
        let normalized = title.trim().to_lowercase();

        let row = match year {
            Some(year) => {
                sqlx::query(&format!(
                    "SELECT {RECORD_COLUMNS} FROM movies
                     WHERE LOWER(title) = ? AND year = ? LIMIT 1"
                ))
                .bind(&normalized)
                .bind(year)
                .fetch_optional(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {RECORD_COLUMNS} FROM movies
                     WHERE LOWER(title) = ? LIMIT 1"
                ))
                .bind(&normalized)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(FelarrError::store)?;

        row.as_ref().map(Self::parse_record).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_pool;

    fn fel_record(key: &str, title: &str) -> CapabilityRecord {
        let mut record = CapabilityRecord::new(key, title)
            .with_dolby_vision(Some("7".to_string()), true);
        record.year = Some(2021);
        record.has_atmos = true;
        record.file_size = Some(70_000_000_000);
        record.video_bitrate = Some(58.0);
        record.extra = serde_json::json!({"resolution": "2160p"});
        record
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let repo = SqliteCapabilityRepository::new(memory_pool().await);
        let record = fel_record("101", "Dune");
        repo.upsert_capability(&record).await.unwrap();

        let loaded = repo.get_by_key("101").await.unwrap().unwrap();
        assert!(loaded.same_capabilities(&record));
        assert_eq!(loaded.resolution(), Some("2160p"));
    }

    #[tokio::test]
    async fn identical_upsert_keeps_timestamp() {
        let repo = SqliteCapabilityRepository::new(memory_pool().await);
        let record = fel_record("101", "Dune");
        repo.upsert_capability(&record).await.unwrap();
        let first = repo.get_by_key("101").await.unwrap().unwrap();

        repo.upsert_capability(&record).await.unwrap();
        let second = repo.get_by_key("101").await.unwrap().unwrap();
        assert_eq!(first.last_updated, second.last_updated);
    }

    #[tokio::test]
    async fn changed_upsert_advances_timestamp() {
        let repo = SqliteCapabilityRepository::new(memory_pool().await);
        let mut record = fel_record("101", "Dune");
        repo.upsert_capability(&record).await.unwrap();
        let first = repo.get_by_key("101").await.unwrap().unwrap();

        record.has_atmos = false;
        repo.upsert_capability(&record).await.unwrap();
        let second = repo.get_by_key("101").await.unwrap().unwrap();
        assert!(second.last_updated >= first.last_updated);
        assert!(!second.has_atmos);
    }

    #[tokio::test]
    async fn predicates_use_indexed_columns() {
        let repo = SqliteCapabilityRepository::new(memory_pool().await);

        repo.upsert_capability(&fel_record("1", "Fel Movie"))
            .await
            .unwrap();

        let mut p5 = CapabilityRecord::new("2", "P5 Movie")
            .with_dolby_vision(Some("5".to_string()), false);
        p5.year = Some(2019);
        repo.upsert_capability(&p5).await.unwrap();

        let mut plain = CapabilityRecord::new("3", "Plain Movie");
        plain.year = Some(2010);
        repo.upsert_capability(&plain).await.unwrap();

        let dv = repo.get_where(CapabilityPredicate::HasDv).await.unwrap();
        assert_eq!(dv.len(), 2);

        let fel = repo.get_where(CapabilityPredicate::HasP7Fel).await.unwrap();
        assert_eq!(fel.len(), 1);
        assert_eq!(fel[0].rating_key, "1");

        let atmos = repo.get_where(CapabilityPredicate::HasAtmos).await.unwrap();
        assert_eq!(atmos.len(), 1);
    }

    #[tokio::test]
    async fn title_lookup_prefers_exact_year() {
        let repo = SqliteCapabilityRepository::new(memory_pool().await);

        let mut remake = fel_record("10", "Dune");
        remake.year = Some(2021);
        repo.upsert_capability(&remake).await.unwrap();

        let mut original = CapabilityRecord::new("11", "Dune");
        original.year = Some(1984);
        repo.upsert_capability(&original).await.unwrap();

        let found = repo.find_by_title("dune", Some(1984)).await.unwrap().unwrap();
        assert_eq!(found.rating_key, "11");

        // wrong year does not fall back to a different edition
        assert!(repo.find_by_title("Dune", Some(2000)).await.unwrap().is_none());

        // unknown year matches by title alone
        assert!(repo.find_by_title("DUNE", None).await.unwrap().is_some());

        assert!(repo
            .find_by_title("Nonexistent", Some(2021))
            .await
            .unwrap()
            .is_none());
    }
}
