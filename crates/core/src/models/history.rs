//! Download history: append-only audit log of attempts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pending::{DownloadStatus, PendingDownload, QualityType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadHistoryEntry {
    pub id: Uuid,
    pub request_id: String,
    pub movie_title: String,
    pub quality_type: QualityType,
    pub torrent_hash: Option<String>,
    pub status: DownloadStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadHistoryEntry {
    /// Audit entry for a pending download entering the given state.
    pub fn for_pending(pending: &PendingDownload, status: DownloadStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: pending.request_id.clone(),
            movie_title: pending.movie_title.clone(),
            quality_type: pending.quality_type,
            torrent_hash: pending.torrent_hash.clone(),
            status,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}
