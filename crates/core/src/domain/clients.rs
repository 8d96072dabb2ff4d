//! Service-client seams
//!
//! Thin trait boundaries over the four external services plus the scanner
//! and tracker, so the workflow crate orchestrates without depending on the
//! concrete clients.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolves a movie's on-disk folder (Radarr).
#[async_trait]
pub trait FolderLookup: Send + Sync {
    /// Root-relative folder for a movie already managed by Radarr, or
    /// `None` when Radarr does not know the movie.
    async fn movie_folder(&self, title: &str, year: Option<i32>) -> Result<Option<String>>;
}

/// One torrent submission to the download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTorrent {
    /// http(s) or magnet URI.
    pub url: String,
    pub save_path: String,
    pub category: String,
    pub paused: bool,
    pub sequential: bool,
}

/// Coarse torrent progress for completion checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentProgress {
    pub hash: String,
    pub state: String,
    /// 0.0 ..= 1.0
    pub progress: f64,
}

impl TorrentProgress {
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
            || matches!(
                self.state.as_str(),
                "uploading" | "stalledUP" | "pausedUP" | "queuedUP" | "forcedUP" | "stoppedUP"
            )
    }
}

/// Torrent queue (qBittorrent).
#[async_trait]
pub trait TorrentQueue: Send + Sync {
    /// Submit a torrent. Returns the torrent hash when it can be derived
    /// from the submitted URI. Transport failures are retried once by the
    /// implementation before they surface.
    async fn add_torrent(&self, request: &AddTorrent) -> Result<Option<String>>;

    /// Progress of a previously added torrent, `None` when unknown.
    async fn torrent_progress(&self, hash: &str) -> Result<Option<TorrentProgress>>;
}

/// Everything the approval dialogue needs to render one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub movie_title: String,
    pub year: Option<i32>,
    /// Pre-rendered current-capability block, one bullet per line.
    pub current_quality: String,
    /// Pre-rendered candidate block.
    pub new_quality: String,
    pub upgrade_reason: String,
    pub target_folder: String,
}

/// User response to an approval dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approved,
    Declined,
}

/// What happened when a decision was applied; drives the terminal text the
/// dialogue edits into the original message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApprovalResult {
    Started { movie_title: String },
    Skipped { movie_title: String },
    Failed { movie_title: String, reason: String },
    /// Approval window elapsed before the user answered.
    Expired { movie_title: String },
    /// Replayed or stale callback; nothing changed.
    AlreadyHandled { status: String },
}

/// Outbound messaging surface (Telegram).
#[async_trait]
pub trait ApprovalGateway: Send + Sync {
    /// Post the interactive approval message; returns the message id.
    async fn send_approval(&self, request: &ApprovalRequest) -> Result<i64>;

    /// Replace an approval message with its terminal text.
    async fn finalize_approval(&self, message_id: i64, result: &ApprovalResult) -> Result<()>;

    /// Plain non-interactive notification.
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Applies a user decision to the workflow. Implemented by the download
/// coordinator, consumed by the callback poller.
#[async_trait]
pub trait ApprovalResponder: Send + Sync {
    async fn handle_approval(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ApprovalResult>;
}

/// Counts coming out of a full library scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total: usize,
    pub dv_count: usize,
    pub p7_fel_count: usize,
    pub atmos_count: usize,
    /// Items skipped because their metadata could not be fetched or parsed.
    pub skipped: usize,
    /// Members newly added to collections, per collection name.
    pub collections_added: Vec<(String, usize)>,
}

/// Result of a verify pass over the curated collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifySummary {
    pub scan: ScanSummary,
    pub removed: Vec<CollectionChange>,
}

/// One collection membership mutation, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionChange {
    pub collection: String,
    pub title: String,
    pub year: Option<i32>,
}

/// Scan orchestration seam (Plex extractor + reconciler), consumed by the
/// monitor loop and the control plane.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    /// Full scan: extract capabilities, then reconcile collections in scan
    /// mode (additions only).
    async fn run_scan(&self) -> Result<ScanSummary>;

    /// Scan plus verify-mode reconciliation (additions and removals).
    async fn run_verify(&self) -> Result<VerifySummary>;
}

/// One release surfaced by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Tracker-stable identifier, used for new-release diffing.
    pub identifier: String,
    pub title: String,
    /// http(s) download link or magnet URI.
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Polling tracker feed. The core consumes this boundary only; whatever
/// scrapes or queries the tracker sits behind it.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Current snapshot of the tracker's matching releases.
    async fn poll(&self) -> Result<Vec<ReleaseRecord>>;
}
