//! Store traits
//!
//! The metadata store is the only shared mutable resource in the process;
//! every component reads and writes through these traits. The SQLite
//! implementations live in the infrastructure crate.

use crate::error::Result;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Keyed store of capability records.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    /// Atomic insert-or-update by rating key. A record identical to the
    /// stored one (ignoring `last_updated`) is a no-op; otherwise the write
    /// happens in a single transaction and `last_updated` never moves
    /// backwards for a key.
    async fn upsert_capability(&self, record: &CapabilityRecord) -> Result<()>;

    async fn get_by_key(&self, rating_key: &str) -> Result<Option<CapabilityRecord>>;

    async fn get_all(&self) -> Result<Vec<CapabilityRecord>>;

    /// Indexed predicate queries backing the curated collections.
    async fn get_where(&self, predicate: CapabilityPredicate) -> Result<Vec<CapabilityRecord>>;

    /// Library lookup used by the download coordinator: normalised title
    /// match, exact year preferred, title-only fallback when the year is
    /// unknown.
    async fn find_by_title(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<CapabilityRecord>>;
}

/// Workflow table of approval-in-flight downloads.
#[async_trait]
pub trait PendingStore: Send + Sync {
    async fn store_pending(&self, pending: &PendingDownload) -> Result<()>;

    async fn get_pending(&self, request_id: &str) -> Result<Option<PendingDownload>>;

    /// Active (non-terminal) rows, newest first.
    async fn list_pending(&self) -> Result<Vec<PendingDownload>>;

    /// Rows currently in `Downloading`, for completion checks.
    async fn list_downloading(&self) -> Result<Vec<PendingDownload>>;

    /// Find an active pending by the Telegram message that announced it.
    /// Recovery path when the in-memory callback mapping is gone.
    async fn find_by_message_id(&self, message_id: i64) -> Result<Option<PendingDownload>>;

    /// Record the message id of the approval dialogue.
    async fn set_message_id(&self, request_id: &str, message_id: i64) -> Result<()>;

    /// `Pending -> Downloading`. Returns false when the row was not in
    /// `Pending` (replayed callback); the store guards transitions so
    /// status never regresses.
    async fn mark_started(&self, request_id: &str, torrent_hash: Option<&str>) -> Result<bool>;

    /// `Downloading -> Completed`.
    async fn mark_completed(&self, request_id: &str) -> Result<bool>;

    /// `Pending -> Declined`.
    async fn mark_declined(&self, request_id: &str) -> Result<bool>;

    /// Expire every `Pending` row whose deadline passed; returns the rows
    /// that were expired for notification cleanup.
    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<PendingDownload>>;

    async fn delete_pending(&self, request_id: &str) -> Result<()>;
}

/// Append-only audit log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_history(&self, entry: &DownloadHistoryEntry) -> Result<()>;

    async fn recent_history(&self, limit: i64) -> Result<Vec<DownloadHistoryEntry>>;

    /// Stamp the history rows of a request completed.
    async fn mark_history_completed(&self, request_id: &str) -> Result<()>;
}

/// Durable settings; the upgrade policy lives here as JSON.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_policy(&self) -> Result<Option<UpgradePolicy>>;

    async fn save_policy(&self, policy: &UpgradePolicy) -> Result<()>;
}
