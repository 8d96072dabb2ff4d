//! Download coordinator
//!
//! Consumes tracker discoveries and drives them through the approval state
//! machine: parse, library lookup, classification, Radarr folder
//! resolution, pending persistence, Telegram approval, qBittorrent
//! dispatch. All transitions go through the store's guarded operations, so
//! replayed callbacks and concurrent sweeps cannot corrupt a row.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use felarr_core::{
    AddTorrent, ApprovalDecision, ApprovalGateway, ApprovalRequest, ApprovalResponder,
    ApprovalResult, CapabilityStore, DownloadHistoryEntry, DownloadStatus, FolderLookup,
    HistoryStore, PendingDownload, PendingStore, QualityType, ReleaseRecord, Result, TorrentQueue,
    UpgradePolicy,
};
use felarr_decision::{classify, parse_release_title, parse_sketch, CapabilitySketch, QualityView};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::render::{render_candidate_quality, render_current_quality};

/// Duplicate-discovery window: the same natural key seen again within this
/// span reuses the original pending.
const DEDUPE_WINDOW_SECS: i64 = 1;

/// What happened to one tracker discovery.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryOutcome {
    /// An approval dialogue is open.
    Pending { request_id: String },
    /// Normal non-actionable outcome.
    Skipped { reason: String },
    /// The discovery could not be completed; no pending row remains.
    Failed { reason: String },
}

pub struct DownloadCoordinator {
    capabilities: Arc<dyn CapabilityStore>,
    pendings: Arc<dyn PendingStore>,
    history: Arc<dyn HistoryStore>,
    folders: Arc<dyn FolderLookup>,
    torrents: Arc<dyn TorrentQueue>,
    gateway: Arc<dyn ApprovalGateway>,
    policy: Arc<RwLock<UpgradePolicy>>,
    /// natural key -> (request id, first seen); bounds duplicate tracker
    /// rows arriving in the same breath.
    recent: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl DownloadCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capabilities: Arc<dyn CapabilityStore>,
        pendings: Arc<dyn PendingStore>,
        history: Arc<dyn HistoryStore>,
        folders: Arc<dyn FolderLookup>,
        torrents: Arc<dyn TorrentQueue>,
        gateway: Arc<dyn ApprovalGateway>,
        policy: Arc<RwLock<UpgradePolicy>>,
    ) -> Self {
        Self {
            capabilities,
            pendings,
            history,
            folders,
            torrents,
            gateway,
            policy,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Process one tracker discovery end to end.
    pub async fn process_discovery(&self, release: &ReleaseRecord) -> Result<DiscoveryOutcome> {
        let Some(parsed) = parse_release_title(&release.title) else {
            debug!(title = release.title.as_str(), "unparseable release title");
            return Ok(DiscoveryOutcome::Skipped {
                reason: "unparseable".to_string(),
            });
        };

        let sketch = parse_sketch(&release.title);
        let natural_key = format!(
            "{}|{}|{}",
            parsed.title.to_lowercase(),
            parsed.year,
            sketch.fingerprint()
        );

        // same release seen twice within the window: one pending only
        if let Some(request_id) = self.recently_seen(&natural_key).await {
            return Ok(DiscoveryOutcome::Pending { request_id });
        }
        if let Some(existing) = self.active_pending_for(&natural_key).await? {
            return Ok(DiscoveryOutcome::Skipped {
                reason: format!("already pending as {}", existing),
            });
        }

        let policy = self.policy.read().await.clone();

        let record = self
            .capabilities
            .find_by_title(&parsed.title, Some(parsed.year))
            .await?;

        let current = match &record {
            Some(record) => QualityView::from(record),
            None if policy.notify_only_library_movies => {
                return Ok(DiscoveryOutcome::Skipped {
                    reason: "not in library".to_string(),
                });
            }
            // own nothing: classify against an empty baseline
            None => QualityView::nothing(),
        };

        let verdict = classify(&current, &sketch, &policy);
        if !verdict.should_notify() {
            info!(
                movie = parsed.title.as_str(),
                reason = verdict.reason(),
                "discovery skipped by policy"
            );
            return Ok(DiscoveryOutcome::Skipped {
                reason: verdict.reason().to_string(),
            });
        }
        let reason = verdict.reason().to_string();
        info!(movie = parsed.title.as_str(), reason = reason.as_str(), "upgrade detected");

        let Some(folder) = self
            .folders
            .movie_folder(&parsed.title, Some(parsed.year))
            .await?
        else {
            return Ok(DiscoveryOutcome::Failed {
                reason: "no folder".to_string(),
            });
        };

        let now = Utc::now();
        let request_id =
            felarr_core::models::pending::make_request_id(&parsed.title, &sketch.fingerprint(), now);

        let current_quality = render_current_quality(record.as_ref());
        let new_quality = render_candidate_quality(&sketch);

        let mut pending = PendingDownload::new(
            request_id.clone(),
            parsed.title.clone(),
            release.link.clone(),
            folder.clone(),
            quality_type_for(&sketch),
            policy.notify_expire_hours,
        );
        pending.year = Some(parsed.year);
        pending.download_data = json!({
            "original_title": release.title,
            "tracker_identifier": release.identifier,
            "natural_key": natural_key,
            "upgrade_reason": reason,
            "current_quality": current_quality,
            "new_quality": new_quality,
        });

        self.pendings.store_pending(&pending).await?;
        self.remember(&natural_key, &request_id, now).await;

        let request = ApprovalRequest {
            request_id: request_id.clone(),
            movie_title: parsed.title.clone(),
            year: Some(parsed.year),
            current_quality,
            new_quality,
            upgrade_reason: reason,
            target_folder: folder,
        };

        match self.gateway.send_approval(&request).await {
            Ok(message_id) => {
                self.pendings.set_message_id(&request_id, message_id).await?;
                Ok(DiscoveryOutcome::Pending { request_id })
            }
            Err(err) => {
                // no dialogue, no pending: the discovery aborts cleanly
                warn!(%err, request_id = request_id.as_str(), "approval send failed");
                self.pendings.delete_pending(&request_id).await?;
                Err(err)
            }
        }
    }

    /// Expire overdue approvals: history entry, terminal message edit,
    /// row removal. Returns the expired rows.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<PendingDownload>> {
        let expired = self.pendings.expire_pending(now).await?;

        for pending in &expired {
            info!(
                request_id = pending.request_id.as_str(),
                movie = pending.movie_title.as_str(),
                "approval expired"
            );

            let entry = DownloadHistoryEntry::for_pending(pending, DownloadStatus::Expired);
            if let Err(err) = self.history.append_history(&entry).await {
                error!(%err, "history append failed for expired pending");
            }

            if let Some(message_id) = pending.telegram_message_id {
                let result = ApprovalResult::Expired {
                    movie_title: pending.movie_title.clone(),
                };
                if let Err(err) = self.gateway.finalize_approval(message_id, &result).await {
                    warn!(%err, message_id, "could not edit expired approval message");
                }
            }

            self.pendings.delete_pending(&pending.request_id).await?;
        }

        Ok(expired)
    }

    /// Check running downloads against the torrent client and complete the
    /// finished ones. Per-row failures are logged and skipped.
    pub async fn check_completions(&self) -> Result<usize> {
        let downloading = self.pendings.list_downloading().await?;
        let mut completed = 0usize;

        for pending in downloading {
            let Some(hash) = pending.torrent_hash.as_deref() else {
                continue;
            };

            let progress = match self.torrents.torrent_progress(hash).await {
                Ok(progress) => progress,
                Err(err) => {
                    warn!(%err, hash, "completion check failed");
                    continue;
                }
            };

            if progress.map(|p| p.is_complete()).unwrap_or(false)
                && self.pendings.mark_completed(&pending.request_id).await?
            {
                completed += 1;
                self.history
                    .mark_history_completed(&pending.request_id)
                    .await?;

                let text = format!(
                    "✅ <b>Download Complete</b>\n\n<b>Movie:</b> {}\n\nPlex should detect both versions soon!",
                    pending.movie_title
                );
                if let Err(err) = self.gateway.notify(&text).await {
                    warn!(%err, "completion notification failed");
                }
            }
        }

        Ok(completed)
    }

    async fn recently_seen(&self, natural_key: &str) -> Option<String> {
        let now = Utc::now();
        let mut recent = self.recent.lock().await;
        recent.retain(|_, value| now - value.1 <= Duration::seconds(DEDUPE_WINDOW_SECS));
        recent.get(natural_key).map(|value| value.0.clone())
    }

    async fn remember(&self, natural_key: &str, request_id: &str, now: DateTime<Utc>) {
        let mut recent = self.recent.lock().await;
        recent.insert(natural_key.to_string(), (request_id.to_string(), now));
    }

    async fn active_pending_for(&self, natural_key: &str) -> Result<Option<String>> {
        let active = self.pendings.list_pending().await?;
        Ok(active
            .into_iter()
            .find(|p| {
                p.download_data
                    .get("natural_key")
                    .and_then(|v| v.as_str())
                    == Some(natural_key)
            })
            .map(|p| p.request_id))
    }

    /// Re-post the approval dialogue for a pending that failed to
    /// dispatch, so the operator can try again.
    async fn repost_approval(&self, pending: &PendingDownload) -> Result<()> {
        let data = &pending.download_data;
        let request = ApprovalRequest {
            request_id: pending.request_id.clone(),
            movie_title: pending.movie_title.clone(),
            year: pending.year,
            current_quality: data
                .get("current_quality")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            new_quality: data
                .get("new_quality")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            upgrade_reason: pending.upgrade_reason().unwrap_or_default().to_string(),
            target_folder: pending.target_folder.clone(),
        };

        let message_id = self.gateway.send_approval(&request).await?;
        self.pendings
            .set_message_id(&pending.request_id, message_id)
            .await
    }
}

fn quality_type_for(sketch: &CapabilitySketch) -> QualityType {
    if sketch.is_fel {
        QualityType::Fel
    } else if sketch.has_dv() {
        QualityType::Dv
    } else if sketch.has_atmos {
        QualityType::Atmos
    } else {
        QualityType::Hdr
    }
}

#[async_trait]
impl ApprovalResponder for DownloadCoordinator {
    async fn handle_approval(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ApprovalResult> {
        let Some(pending) = self.pendings.get_pending(request_id).await? else {
            return Ok(ApprovalResult::AlreadyHandled {
                status: "unknown".to_string(),
            });
        };

        if pending.status != DownloadStatus::Pending {
            // replayed callback after a transition: report, change nothing
            return Ok(ApprovalResult::AlreadyHandled {
                status: pending.status.to_string(),
            });
        }

        match decision {
            ApprovalDecision::Declined => {
                if !self.pendings.mark_declined(request_id).await? {
                    let current = self.pendings.get_pending(request_id).await?;
                    return Ok(ApprovalResult::AlreadyHandled {
                        status: current
                            .map(|p| p.status.to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                    });
                }

                info!(request_id, movie = pending.movie_title.as_str(), "download declined");
                let entry = DownloadHistoryEntry::for_pending(&pending, DownloadStatus::Declined);
                self.history.append_history(&entry).await?;
                self.pendings.delete_pending(request_id).await?;

                Ok(ApprovalResult::Skipped {
                    movie_title: pending.movie_title,
                })
            }
            ApprovalDecision::Approved => {
                let add = AddTorrent {
                    url: pending.torrent_url.clone(),
                    save_path: pending.target_folder.clone(),
                    category: pending.quality_type.category(),
                    paused: false,
                    sequential: true,
                };

                match self.torrents.add_torrent(&add).await {
                    Ok(hash) => {
                        if !self
                            .pendings
                            .mark_started(request_id, hash.as_deref())
                            .await?
                        {
                            let current = self.pendings.get_pending(request_id).await?;
                            return Ok(ApprovalResult::AlreadyHandled {
                                status: current
                                    .map(|p| p.status.to_string())
                                    .unwrap_or_else(|| "unknown".to_string()),
                            });
                        }

                        info!(
                            request_id,
                            movie = pending.movie_title.as_str(),
                            folder = pending.target_folder.as_str(),
                            "download started"
                        );

                        let mut started = pending.clone();
                        started.torrent_hash = hash;
                        let entry =
                            DownloadHistoryEntry::for_pending(&started, DownloadStatus::Downloading);
                        self.history.append_history(&entry).await?;

                        Ok(ApprovalResult::Started {
                            movie_title: pending.movie_title,
                        })
                    }
                    Err(err) => {
                        // the client already retried transport failures
                        // once; the row stays pending and a fresh dialogue
                        // goes out so the operator can try again
                        error!(%err, request_id, "torrent dispatch failed");

                        let notice = format!(
                            "❌ <b>Download Error</b>\n\n<b>Movie:</b> {}\n<b>Error:</b> {}",
                            pending.movie_title, err
                        );
                        if let Err(notify_err) = self.gateway.notify(&notice).await {
                            warn!(%notify_err, "error notice failed");
                        }

                        if let Err(repost_err) = self.repost_approval(&pending).await {
                            warn!(%repost_err, "approval repost failed");
                        }

                        Ok(ApprovalResult::Failed {
                            movie_title: pending.movie_title,
                            reason: err.to_string(),
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
