//! Monitor loop
//!
//! Single long-lived task owning the periodic work: full scans every
//! `scan_frequency` hours, tracker polls on their own cadence, and the
//! expiry/completion sweep every tick. Scans and polls are mutually
//! exclusive through the scan gate; a poll that lands during a scan is
//! queued once and coalesced. Cancellation is honoured within one tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use felarr_core::{ReleaseSource, ScanRunner, ServiceState};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::{DiscoveryOutcome, DownloadCoordinator};
use crate::state::StateView;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub scan_frequency_hours: i64,
    pub tracker_poll_minutes: i64,
    /// Loop granularity; also the sweep cadence.
    pub tick: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_frequency_hours: 24,
            tracker_poll_minutes: 120,
            tick: Duration::from_secs(60),
        }
    }
}

pub struct MonitorLoop {
    scan_runner: Arc<dyn ScanRunner>,
    source: Arc<dyn ReleaseSource>,
    coordinator: Arc<DownloadCoordinator>,
    state: StateView,
    /// Shared with the control plane; whoever holds it is scanning.
    scan_gate: Arc<Mutex<()>>,
    config: MonitorConfig,
    seen: Mutex<HashSet<String>>,
}

impl MonitorLoop {
    pub fn new(
        scan_runner: Arc<dyn ScanRunner>,
        source: Arc<dyn ReleaseSource>,
        coordinator: Arc<DownloadCoordinator>,
        state: StateView,
        scan_gate: Arc<Mutex<()>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            scan_runner,
            source,
            coordinator,
            state,
            scan_gate,
            config,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Run until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            scan_hours = self.config.scan_frequency_hours,
            poll_minutes = self.config.tracker_poll_minutes,
            "monitor loop started"
        );
        self.state.set_state(ServiceState::Monitoring);

        let mut next_scan = Utc::now();
        let mut next_poll = Utc::now();
        let mut queued_poll = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("monitor loop stopping");
                    self.state.set_state(ServiceState::Idle);
                    return;
                }
                _ = tokio::time::sleep(self.config.tick) => {}
            }

            let now = Utc::now();

            if let Err(err) = self.coordinator.sweep_expired(now).await {
                error!(%err, "expiry sweep failed");
            }
            if let Err(err) = self.coordinator.check_completions().await {
                error!(%err, "completion check failed");
            }

            if now >= next_scan {
                self.run_scheduled_scan().await;
                // advanced after completion, never from the trigger time
                next_scan = Utc::now() + chrono::Duration::hours(self.config.scan_frequency_hours);
                self.state.update(|s| s.next_scan = Some(next_scan));
            }

            let poll_due = now >= next_poll;
            if poll_due || queued_poll {
                match self.scan_gate.try_lock() {
                    Ok(_guard) => {
                        queued_poll = false;
                        self.poll_tracker().await;
                        next_poll = Utc::now()
                            + chrono::Duration::minutes(self.config.tracker_poll_minutes);
                    }
                    Err(_) => {
                        // a scan holds the gate; remember exactly one poll
                        debug!("tracker poll deferred; scan in progress");
                        queued_poll = true;
                        if poll_due {
                            next_poll = Utc::now()
                                + chrono::Duration::minutes(self.config.tracker_poll_minutes);
                        }
                    }
                }
            }
        }
    }

    async fn run_scheduled_scan(&self) {
        let Ok(_guard) = self.scan_gate.try_lock() else {
            debug!("scheduled scan skipped; another scan is running");
            return;
        };

        self.state.set_state(ServiceState::Scanning);
        match self.scan_runner.run_scan().await {
            Ok(summary) => {
                info!(
                    total = summary.total,
                    dv = summary.dv_count,
                    fel = summary.p7_fel_count,
                    atmos = summary.atmos_count,
                    "scheduled scan finished"
                );
                let completed_at = Utc::now();
                self.state.update(|s| {
                    s.last_scan = Some(completed_at);
                    s.total_movies = summary.total;
                    s.dv_count = summary.dv_count;
                    s.p7_fel_count = summary.p7_fel_count;
                    s.atmos_count = summary.atmos_count;
                    s.last_error = None;
                });
            }
            Err(err) => {
                error!(%err, "scheduled scan failed");
                self.state.set_error(Some(err.to_string()));
            }
        }
        self.state.set_state(ServiceState::Monitoring);
    }

    /// Pull the tracker snapshot, diff against seen identifiers and hand
    /// each new record to the coordinator.
    async fn poll_tracker(&self) {
        let releases = match self.source.poll().await {
            Ok(releases) => releases,
            Err(err) => {
                error!(%err, "tracker poll failed");
                self.state.set_error(Some(err.to_string()));
                return;
            }
        };

        let fresh: Vec<_> = {
            let mut seen = self.seen.lock().await;
            releases
                .into_iter()
                .filter(|release| seen.insert(release.identifier.clone()))
                .collect()
        };

        if fresh.is_empty() {
            debug!("tracker poll found nothing new");
            return;
        }
        info!(count = fresh.len(), "new tracker releases");

        for release in fresh {
            match self.coordinator.process_discovery(&release).await {
                Ok(DiscoveryOutcome::Pending { request_id }) => {
                    info!(
                        release = release.title.as_str(),
                        request_id = request_id.as_str(),
                        "approval opened"
                    );
                }
                Ok(DiscoveryOutcome::Skipped { reason }) => {
                    debug!(release = release.title.as_str(), reason = reason.as_str(), "skipped");
                }
                Ok(DiscoveryOutcome::Failed { reason }) => {
                    warn!(release = release.title.as_str(), reason = reason.as_str(), "discovery failed");
                }
                Err(err) => {
                    error!(release = release.title.as_str(), %err, "discovery errored");
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn poll_tracker_for_test(&self) {
        self.poll_tracker().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use felarr_core::{
        CapabilityStore, FolderLookup, HistoryStore, PendingStore, ReleaseRecord, Result,
        ScanSummary, TorrentQueue, UpgradePolicy, VerifySummary,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    struct CountingSource {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl ReleaseSource for CountingSource {
        async fn poll(&self) -> Result<Vec<ReleaseRecord>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                ReleaseRecord {
                    identifier: "1".to_string(),
                    title: "Nothing Useful".to_string(),
                    link: "magnet:?".to_string(),
                    published_at: None,
                },
                ReleaseRecord {
                    identifier: "1".to_string(),
                    title: "Nothing Useful".to_string(),
                    link: "magnet:?".to_string(),
                    published_at: None,
                },
            ])
        }
    }

    struct IdleRunner;

    #[async_trait]
    impl ScanRunner for IdleRunner {
        async fn run_scan(&self) -> Result<ScanSummary> {
            Ok(ScanSummary::default())
        }
        async fn run_verify(&self) -> Result<VerifySummary> {
            Ok(VerifySummary::default())
        }
    }

    struct NullStores;

    #[async_trait]
    impl CapabilityStore for NullStores {
        async fn upsert_capability(&self, _: &felarr_core::CapabilityRecord) -> Result<()> {
            Ok(())
        }
        async fn get_by_key(&self, _: &str) -> Result<Option<felarr_core::CapabilityRecord>> {
            Ok(None)
        }
        async fn get_all(&self) -> Result<Vec<felarr_core::CapabilityRecord>> {
            Ok(Vec::new())
        }
        async fn get_where(
            &self,
            _: felarr_core::CapabilityPredicate,
        ) -> Result<Vec<felarr_core::CapabilityRecord>> {
            Ok(Vec::new())
        }
        async fn find_by_title(
            &self,
            _: &str,
            _: Option<i32>,
        ) -> Result<Option<felarr_core::CapabilityRecord>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl PendingStore for NullStores {
        async fn store_pending(&self, _: &felarr_core::PendingDownload) -> Result<()> {
            Ok(())
        }
        async fn get_pending(&self, _: &str) -> Result<Option<felarr_core::PendingDownload>> {
            Ok(None)
        }
        async fn list_pending(&self) -> Result<Vec<felarr_core::PendingDownload>> {
            Ok(Vec::new())
        }
        async fn list_downloading(&self) -> Result<Vec<felarr_core::PendingDownload>> {
            Ok(Vec::new())
        }
        async fn find_by_message_id(
            &self,
            _: i64,
        ) -> Result<Option<felarr_core::PendingDownload>> {
            Ok(None)
        }
        async fn set_message_id(&self, _: &str, _: i64) -> Result<()> {
            Ok(())
        }
        async fn mark_started(&self, _: &str, _: Option<&str>) -> Result<bool> {
            Ok(false)
        }
        async fn mark_completed(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn mark_declined(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn expire_pending(
            &self,
            _: DateTime<Utc>,
        ) -> Result<Vec<felarr_core::PendingDownload>> {
            Ok(Vec::new())
        }
        async fn delete_pending(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl HistoryStore for NullStores {
        async fn append_history(&self, _: &felarr_core::DownloadHistoryEntry) -> Result<()> {
            Ok(())
        }
        async fn recent_history(&self, _: i64) -> Result<Vec<felarr_core::DownloadHistoryEntry>> {
            Ok(Vec::new())
        }
        async fn mark_history_completed(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl FolderLookup for NullStores {
        async fn movie_folder(&self, _: &str, _: Option<i32>) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl TorrentQueue for NullStores {
        async fn add_torrent(&self, _: &felarr_core::AddTorrent) -> Result<Option<String>> {
            Ok(None)
        }
        async fn torrent_progress(
            &self,
            _: &str,
        ) -> Result<Option<felarr_core::TorrentProgress>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl felarr_core::ApprovalGateway for NullStores {
        async fn send_approval(&self, _: &felarr_core::ApprovalRequest) -> Result<i64> {
            Ok(1)
        }
        async fn finalize_approval(
            &self,
            _: i64,
            _: &felarr_core::ApprovalResult,
        ) -> Result<()> {
            Ok(())
        }
        async fn notify(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn monitor_with_source(source: Arc<CountingSource>) -> MonitorLoop {
        let stores = Arc::new(NullStores);
        let coordinator = Arc::new(DownloadCoordinator::new(
            stores.clone(),
            stores.clone(),
            stores.clone(),
            stores.clone(),
            stores.clone(),
            stores.clone(),
            Arc::new(RwLock::new(UpgradePolicy::default())),
        ));

        MonitorLoop::new(
            Arc::new(IdleRunner),
            source,
            coordinator,
            StateView::new(),
            Arc::new(Mutex::new(())),
            MonitorConfig {
                tick: Duration::from_millis(10),
                ..MonitorConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn duplicate_identifiers_are_polled_once() {
        let source = Arc::new(CountingSource {
            polls: AtomicUsize::new(0),
        });
        let monitor = monitor_with_source(source.clone());

        // two polls, the identifier is diffed away the second time and
        // within the first snapshot
        monitor.poll_tracker_for_test().await;
        monitor.poll_tracker_for_test().await;

        assert_eq!(source.polls.load(Ordering::SeqCst), 2);
        let seen = monitor.seen.lock().await;
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_within_a_tick() {
        let source = Arc::new(CountingSource {
            polls: AtomicUsize::new(0),
        });
        let monitor = Arc::new(monitor_with_source(source));

        let cancel = CancellationToken::new();
        let handle = {
            let monitor = monitor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
    }
}
