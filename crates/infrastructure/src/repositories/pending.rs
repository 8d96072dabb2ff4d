//! SQLite implementation of the pending-download store
//!
//! Status transitions are guarded UPDATEs keyed on the current status, so
//! a replayed callback or a concurrent sweep can never move a row
//! backwards along the state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use felarr_core::{
    DownloadStatus, FelarrError, PendingDownload, PendingStore, QualityType, Result,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::database::DatabasePool;

const PENDING_COLUMNS: &str = "request_id, movie_title, year, torrent_url, target_folder, \
                               quality_type, status, telegram_message_id, torrent_hash, \
                               download_data, created_at, approved_at, completed_at, expires_at";

pub struct SqlitePendingRepository {
    pool: DatabasePool,
}

impl SqlitePendingRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn parse_pending(row: &SqliteRow) -> Result<PendingDownload> {
        let quality_raw: String = row.try_get("quality_type").map_err(FelarrError::store)?;
        let status_raw: String = row.try_get("status").map_err(FelarrError::store)?;
        let data_raw: String = row.try_get("download_data").map_err(FelarrError::store)?;

        Ok(PendingDownload {
            request_id: row.try_get("request_id").map_err(FelarrError::store)?,
            movie_title: row.try_get("movie_title").map_err(FelarrError::store)?,
            year: row.try_get("year").map_err(FelarrError::store)?,
            torrent_url: row.try_get("torrent_url").map_err(FelarrError::store)?,
            target_folder: row.try_get("target_folder").map_err(FelarrError::store)?,
            quality_type: QualityType::parse(&quality_raw).ok_or_else(|| {
                FelarrError::store(format!("unknown quality type '{quality_raw}'"))
            })?,
            status: DownloadStatus::parse(&status_raw)
                .ok_or_else(|| FelarrError::store(format!("unknown status '{status_raw}'")))?,
            telegram_message_id: row
                .try_get("telegram_message_id")
                .map_err(FelarrError::store)?,
            torrent_hash: row.try_get("torrent_hash").map_err(FelarrError::store)?,
            download_data: serde_json::from_str(&data_raw).map_err(FelarrError::store)?,
            created_at: row.try_get("created_at").map_err(FelarrError::store)?,
            approved_at: row.try_get("approved_at").map_err(FelarrError::store)?,
            completed_at: row.try_get("completed_at").map_err(FelarrError::store)?,
            expires_at: row.try_get("expires_at").map_err(FelarrError::store)?,
        })
    }

    async fn fetch_where(&self, condition: &str) -> Result<Vec<PendingDownload>> {
        let rows = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_downloads
             WHERE {condition} ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        rows.iter().map(Self::parse_pending).collect()
    }
}

#[async_trait]
impl PendingStore for SqlitePendingRepository {
    async fn store_pending(&self, pending: &PendingDownload) -> Result<()> {
        let data = serde_json::to_string(&pending.download_data).map_err(FelarrError::store)?;

        // conflict means the same natural key within the same second;
        // the first row wins and the duplicate dissolves
        sqlx::query(
            "INSERT INTO pending_downloads (
                 request_id, movie_title, year, torrent_url, target_folder,
                 quality_type, status, telegram_message_id, torrent_hash,
                 download_data, created_at, approved_at, completed_at, expires_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(&pending.request_id)
        .bind(&pending.movie_title)
        .bind(pending.year)
        .bind(&pending.torrent_url)
        .bind(&pending.target_folder)
        .bind(pending.quality_type.as_str())
        .bind(pending.status.as_str())
        .bind(pending.telegram_message_id)
        .bind(&pending.torrent_hash)
        .bind(data)
        .bind(pending.created_at)
        .bind(pending.approved_at)
        .bind(pending.completed_at)
        .bind(pending.expires_at)
        .execute(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        Ok(())
    }

    async fn get_pending(&self, request_id: &str) -> Result<Option<PendingDownload>> {
        let row = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_downloads WHERE request_id = ?"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        row.as_ref().map(Self::parse_pending).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<PendingDownload>> {
        self.fetch_where("status IN ('pending', 'downloading')")
            .await
    }

    async fn list_downloading(&self) -> Result<Vec<PendingDownload>> {
        self.fetch_where("status = 'downloading'").await
    }

    async fn find_by_message_id(&self, message_id: i64) -> Result<Option<PendingDownload>> {
        let row = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_downloads
             WHERE telegram_message_id = ? AND status IN ('pending', 'downloading')
             LIMIT 1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        row.as_ref().map(Self::parse_pending).transpose()
    }

    async fn set_message_id(&self, request_id: &str, message_id: i64) -> Result<()> {
        sqlx::query("UPDATE pending_downloads SET telegram_message_id = ? WHERE request_id = ?")
            .bind(message_id)
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(FelarrError::store)?;
        Ok(())
    }

    async fn mark_started(&self, request_id: &str, torrent_hash: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE pending_downloads
             SET status = 'downloading', approved_at = ?, torrent_hash = ?
             WHERE request_id = ? AND status = 'pending'",
        )
        .bind(Utc::now())
        .bind(torrent_hash)
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(&self, request_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE pending_downloads
             SET status = 'completed', completed_at = ?
             WHERE request_id = ? AND status = 'downloading'",
        )
        .bind(Utc::now())
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_declined(&self, request_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE pending_downloads
             SET status = 'declined'
             WHERE request_id = ? AND status = 'pending'",
        )
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<PendingDownload>> {
        let mut tx = self.pool.begin().await.map_err(FelarrError::store)?;

        let rows = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_downloads
             WHERE status = 'pending' AND expires_at < ?"
        ))
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(FelarrError::store)?;

        let mut expired: Vec<PendingDownload> =
            rows.iter().map(Self::parse_pending).collect::<Result<_>>()?;

        sqlx::query(
            "UPDATE pending_downloads
             SET status = 'expired'
             WHERE status = 'pending' AND expires_at < ?",
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(FelarrError::store)?;

        tx.commit().await.map_err(FelarrError::store)?;

        for pending in &mut expired {
            pending.status = DownloadStatus::Expired;
        }
        Ok(expired)
    }

    async fn delete_pending(&self, request_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_downloads WHERE request_id = ?")
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(FelarrError::store)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_pool;
    use chrono::Duration;

    fn pending(request_id: &str) -> PendingDownload {
        let mut pending = PendingDownload::new(
            request_id,
            "Dune",
            "magnet:?xt=urn:btih:abc",
            "/movies/Dune (2021)",
            QualityType::Fel,
            24,
        );
        pending.year = Some(2021);
        pending.download_data = serde_json::json!({"upgrade_reason": "DV P5 → P7 FEL"});
        pending
    }

    #[tokio::test]
    async fn store_and_load_round_trips() {
        let repo = SqlitePendingRepository::new(memory_pool().await);
        repo.store_pending(&pending("req1")).await.unwrap();

        let loaded = repo.get_pending("req1").await.unwrap().unwrap();
        assert_eq!(loaded.movie_title, "Dune");
        assert_eq!(loaded.status, DownloadStatus::Pending);
        assert_eq!(loaded.quality_type, QualityType::Fel);
        assert_eq!(loaded.upgrade_reason(), Some("DV P5 → P7 FEL"));
    }

    #[tokio::test]
    async fn duplicate_request_id_is_a_noop() {
        let repo = SqlitePendingRepository::new(memory_pool().await);
        repo.store_pending(&pending("req1")).await.unwrap();

        let mut duplicate = pending("req1");
        duplicate.movie_title = "Other".to_string();
        repo.store_pending(&duplicate).await.unwrap();

        let loaded = repo.get_pending("req1").await.unwrap().unwrap();
        assert_eq!(loaded.movie_title, "Dune");
        assert_eq!(repo.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transitions_are_guarded() {
        let repo = SqlitePendingRepository::new(memory_pool().await);
        repo.store_pending(&pending("req1")).await.unwrap();

        assert!(repo.mark_started("req1", Some("HASH")).await.unwrap());
        // replay is a no-op
        assert!(!repo.mark_started("req1", Some("HASH")).await.unwrap());
        // a downloading row cannot be declined
        assert!(!repo.mark_declined("req1").await.unwrap());

        let loaded = repo.get_pending("req1").await.unwrap().unwrap();
        assert_eq!(loaded.status, DownloadStatus::Downloading);
        assert!(loaded.approved_at.is_some());
        assert_eq!(loaded.torrent_hash.as_deref(), Some("HASH"));

        assert!(repo.mark_completed("req1").await.unwrap());
        assert!(!repo.mark_completed("req1").await.unwrap());
    }

    #[tokio::test]
    async fn expire_sweep_only_touches_overdue_pending() {
        let repo = SqlitePendingRepository::new(memory_pool().await);

        let mut overdue = pending("old");
        overdue.expires_at = Utc::now() - Duration::hours(1);
        repo.store_pending(&overdue).await.unwrap();

        repo.store_pending(&pending("fresh")).await.unwrap();

        let mut downloading = pending("active");
        downloading.expires_at = Utc::now() - Duration::hours(1);
        repo.store_pending(&downloading).await.unwrap();
        repo.mark_started("active", None).await.unwrap();

        let expired = repo.expire_pending(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].request_id, "old");
        assert_eq!(expired[0].status, DownloadStatus::Expired);

        let fresh = repo.get_pending("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.status, DownloadStatus::Pending);
        let active = repo.get_pending("active").await.unwrap().unwrap();
        assert_eq!(active.status, DownloadStatus::Downloading);
    }

    #[tokio::test]
    async fn message_id_lookup_recovers_active_rows() {
        let repo = SqlitePendingRepository::new(memory_pool().await);
        repo.store_pending(&pending("req1")).await.unwrap();
        repo.set_message_id("req1", 777).await.unwrap();

        let found = repo.find_by_message_id(777).await.unwrap().unwrap();
        assert_eq!(found.request_id, "req1");
        assert_eq!(found.telegram_message_id, Some(777));

        assert!(repo.find_by_message_id(123).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let repo = SqlitePendingRepository::new(memory_pool().await);
        repo.store_pending(&pending("req1")).await.unwrap();
        repo.delete_pending("req1").await.unwrap();
        assert!(repo.get_pending("req1").await.unwrap().is_none());
    }
}
