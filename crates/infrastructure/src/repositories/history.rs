//! SQLite implementation of the download-history log

use async_trait::async_trait;
use chrono::Utc;
use felarr_core::{
    DownloadHistoryEntry, DownloadStatus, FelarrError, HistoryStore, QualityType, Result,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::database::DatabasePool;

pub struct SqliteHistoryRepository {
    pool: DatabasePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn parse_entry(row: &SqliteRow) -> Result<DownloadHistoryEntry> {
        let id_raw: String = row.try_get("id").map_err(FelarrError::store)?;
        let quality_raw: String = row.try_get("quality_type").map_err(FelarrError::store)?;
        let status_raw: String = row.try_get("status").map_err(FelarrError::store)?;

        Ok(DownloadHistoryEntry {
            id: Uuid::parse_str(&id_raw).map_err(FelarrError::store)?,
            request_id: row.try_get("request_id").map_err(FelarrError::store)?,
            movie_title: row.try_get("movie_title").map_err(FelarrError::store)?,
            quality_type: QualityType::parse(&quality_raw).ok_or_else(|| {
                FelarrError::store(format!("unknown quality type '{quality_raw}'"))
            })?,
            torrent_hash: row.try_get("torrent_hash").map_err(FelarrError::store)?,
            status: DownloadStatus::parse(&status_raw)
                .ok_or_else(|| FelarrError::store(format!("unknown status '{status_raw}'")))?,
            started_at: row.try_get("started_at").map_err(FelarrError::store)?,
            completed_at: row.try_get("completed_at").map_err(FelarrError::store)?,
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryRepository {
    async fn append_history(&self, entry: &DownloadHistoryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO download_history (
                 id, request_id, movie_title, quality_type, torrent_hash,
                 status, started_at, completed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(&entry.request_id)
        .bind(&entry.movie_title)
        .bind(entry.quality_type.as_str())
        .bind(&entry.torrent_hash)
        .bind(entry.status.as_str())
        .bind(entry.started_at)
        .bind(entry.completed_at)
        .execute(&self.pool)
        .await
        .map_err(FelarrError::store)?;
        Ok(())
    }

    async fn recent_history(&self, limit: i64) -> Result<Vec<DownloadHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, request_id, movie_title, quality_type, torrent_hash,
                    status, started_at, completed_at
             FROM download_history
             ORDER BY started_at DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(FelarrError::store)?;

        rows.iter().map(Self::parse_entry).collect()
    }

    async fn mark_history_completed(&self, request_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE download_history
             SET status = 'completed', completed_at = ?
             WHERE request_id = ? AND status = 'downloading'",
        )
        .bind(Utc::now())
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
    use felarr_core::PendingDownload;

    #[tokio::test]
    async fn append_and_read_back() {
        let repo = SqliteHistoryRepository::new(memory_pool().await);

        let pending = PendingDownload::new(
            "req1",
            "Dune",
            "magnet:?",
            "/movies",
            QualityType::Fel,
            24,
        );
        let entry = DownloadHistoryEntry::for_pending(&pending, DownloadStatus::Downloading);
        repo.append_history(&entry).await.unwrap();

        let recent = repo.recent_history(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].movie_title, "Dune");
        assert_eq!(recent[0].status, DownloadStatus::Downloading);

        repo.mark_history_completed("req1").await.unwrap();
        let recent = repo.recent_history(10).await.unwrap();
        assert_eq!(recent[0].status, DownloadStatus::Completed);
        assert!(recent[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let repo = SqliteHistoryRepository::new(memory_pool().await);
        for i in 0..5 {
            let pending = PendingDownload::new(
                format!("req{i}"),
                "Movie",
                "magnet:?",
                "/movies",
                QualityType::Dv,
                24,
            );
            repo.append_history(&DownloadHistoryEntry::for_pending(
                &pending,
                DownloadStatus::Downloading,
            ))
            .await
            .unwrap();
        }
        assert_eq!(repo.recent_history(3).await.unwrap().len(), 3);
    }
}
