//! Pending download: an approval-in-flight record from tracker discovery
//! to qBittorrent dispatch

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What kind of quality gain the candidate represents. Drives the
/// qBittorrent category (`movies-fel`, `movies-dv`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityType {
    Fel,
    Dv,
    Hdr,
    Atmos,
}

impl QualityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityType::Fel => "fel",
            QualityType::Dv => "dv",
            QualityType::Hdr => "hdr",
            QualityType::Atmos => "atmos",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fel" => Some(QualityType::Fel),
            "dv" => Some(QualityType::Dv),
            "hdr" => Some(QualityType::Hdr),
            "atmos" => Some(QualityType::Atmos),
            _ => None,
        }
    }

    /// Download category handed to qBittorrent.
    pub fn category(&self) -> String {
        format!("movies-{}", self.as_str())
    }
}

impl std::fmt::Display for QualityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a pending download.
///
/// `Pending -> Downloading -> Completed`, with `Declined` and `Expired` as
/// the other terminal states. Only `Pending -> Downloading` has external
/// side effects beyond the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Declined,
    Expired,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Declined => "declined",
            DownloadStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DownloadStatus::Pending),
            "downloading" => Some(DownloadStatus::Downloading),
            "completed" => Some(DownloadStatus::Completed),
            "declined" => Some(DownloadStatus::Declined),
            "expired" => Some(DownloadStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Declined | DownloadStatus::Expired
        )
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approval-in-flight download request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDownload {
    pub request_id: String,
    pub movie_title: String,
    pub year: Option<i32>,
    pub torrent_url: String,
    pub target_folder: String,
    pub quality_type: QualityType,
    pub status: DownloadStatus,
    pub telegram_message_id: Option<i64>,
    pub torrent_hash: Option<String>,
    /// Full serialised context needed to rehydrate the request after a
    /// restart: rendered quality blocks, upgrade reason, original title.
    pub download_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl PendingDownload {
    pub fn new(
        request_id: impl Into<String>,
        movie_title: impl Into<String>,
        torrent_url: impl Into<String>,
        target_folder: impl Into<String>,
        quality_type: QualityType,
        expire_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            movie_title: movie_title.into(),
            year: None,
            torrent_url: torrent_url.into(),
            target_folder: target_folder.into(),
            quality_type,
            status: DownloadStatus::Pending,
            telegram_message_id: None,
            torrent_hash: None,
            download_data: serde_json::json!({}),
            created_at: now,
            approved_at: None,
            completed_at: None,
            expires_at: now + Duration::hours(expire_hours),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == DownloadStatus::Pending && self.expires_at < now
    }

    /// Upgrade reason recorded at discovery time, if present.
    pub fn upgrade_reason(&self) -> Option<&str> {
        self.download_data
            .get("upgrade_reason")
            .and_then(|v| v.as_str())
    }
}

/// Derive the 12-hex request id from the natural key of a discovery.
///
/// The timestamp below is second-granular on purpose: the same release seen
/// twice within one second hashes to the same id, which is the dedupe
/// guarantee the coordinator relies on.
pub fn make_request_id(title: &str, sketch_fingerprint: &str, now: DateTime<Utc>) -> String {
    let seed = format!("{}|{}|{}", title, sketch_fingerprint, now.timestamp());
    let digest = md5::compute(seed.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_stable_within_one_second() {
        let now = Utc::now();
        let a = make_request_id("Dune", "fel/2160p/atmos", now);
        let b = make_request_id("Dune", "fel/2160p/atmos", now + Duration::milliseconds(400));
        assert_eq!(a.len(), 12);
        assert_eq!(a, b);

        let c = make_request_id("Dune", "fel/2160p/atmos", now + Duration::seconds(2));
        assert_ne!(a, c);
    }

    #[test]
    fn status_round_trips() {
        for status in [
            DownloadStatus::Pending,
            DownloadStatus::Downloading,
            DownloadStatus::Completed,
            DownloadStatus::Declined,
            DownloadStatus::Expired,
        ] {
            assert_eq!(DownloadStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DownloadStatus::parse("bogus"), None);
    }

    #[test]
    fn expiry_only_applies_to_pending() {
        let mut pending = PendingDownload::new("abc", "Dune", "magnet:?", "/movies", QualityType::Fel, 24);
        let later = Utc::now() + Duration::hours(25);
        assert!(pending.is_expired(later));

        pending.status = DownloadStatus::Downloading;
        assert!(!pending.is_expired(later));
    }

    #[test]
    fn category_follows_quality_type() {
        assert_eq!(QualityType::Fel.category(), "movies-fel");
        assert_eq!(QualityType::Atmos.category(), "movies-atmos");
    }
}
