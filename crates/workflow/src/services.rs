//! CoreServices: the injected container the control plane talks to
//!
//! Holds the store, the shared policy, the scan gate and the state view,
//! and exposes the small command/query surface the UI layer needs. No
//! global state; the binary builds one of these and hands it around.

use std::sync::Arc;

use chrono::Utc;
use felarr_core::{
    CapabilityRecord, CapabilityStore, DownloadHistoryEntry, FelarrError, HistoryStore,
    PendingDownload, PendingStore, Result, ScanRunner, ScanSummary, ServiceState, SettingsStore,
    StatusSnapshot, UpgradePolicy, VerifySummary,
};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::coordinator::DownloadCoordinator;
use crate::state::StateView;

pub struct CoreServices {
    pub capabilities: Arc<dyn CapabilityStore>,
    pub pendings: Arc<dyn PendingStore>,
    pub history: Arc<dyn HistoryStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub coordinator: Arc<DownloadCoordinator>,
    pub scan_runner: Arc<dyn ScanRunner>,
    pub policy: Arc<RwLock<UpgradePolicy>>,
    pub state: StateView,
    /// Held for the duration of any scan or verify; polls defer on it.
    pub scan_gate: Arc<Mutex<()>>,
}

impl CoreServices {
    /// Current status snapshot for the UI.
    pub fn status(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    /// Run a full scan now. Refused while another scan holds the gate.
    pub async fn trigger_scan(&self) -> Result<ScanSummary> {
        let _guard = self.scan_gate.try_lock().map_err(|_| {
            FelarrError::ValidationError {
                field: "scan".to_string(),
                message: "a scan is already running".to_string(),
            }
        })?;

        info!("manual scan triggered");
        let previous = self.status().state;
        self.state.set_state(ServiceState::Scanning);

        let result = self.scan_runner.run_scan().await;
        match &result {
            Ok(summary) => self.apply_summary(summary),
            Err(err) => self.state.set_error(Some(err.to_string())),
        }
        self.state.set_state(previous);
        result
    }

    /// Run a verify pass (scan plus collection removal) now.
    pub async fn trigger_verify(&self) -> Result<VerifySummary> {
        let _guard = self.scan_gate.try_lock().map_err(|_| {
            FelarrError::ValidationError {
                field: "verify".to_string(),
                message: "a scan is already running".to_string(),
            }
        })?;

        info!("manual verify triggered");
        let previous = self.status().state;
        self.state.set_state(ServiceState::Verifying);

        let result = self.scan_runner.run_verify().await;
        match &result {
            Ok(verify) => self.apply_summary(&verify.scan),
            Err(err) => self.state.set_error(Some(err.to_string())),
        }
        self.state.set_state(previous);
        result
    }

    fn apply_summary(&self, summary: &ScanSummary) {
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

    /// Active pendings, newest first.
    pub async fn list_pending(&self) -> Result<Vec<PendingDownload>> {
        self.pendings.list_pending().await
    }

    pub async fn recent_history(&self, limit: i64) -> Result<Vec<DownloadHistoryEntry>> {
        self.history.recent_history(limit).await
    }

    pub async fn all_capabilities(&self) -> Result<Vec<CapabilityRecord>> {
        self.capabilities.get_all().await
    }

    pub async fn current_policy(&self) -> UpgradePolicy {
        self.policy.read().await.clone()
    }

    /// Persist and apply a new upgrade policy.
    pub async fn update_policy(&self, policy: UpgradePolicy) -> Result<()> {
        self.settings.save_policy(&policy).await?;
        *self.policy.write().await = policy;
        info!("upgrade policy updated");
        Ok(())
    }

    /// Sweep expired approvals now; returns how many were expired.
    pub async fn sweep_now(&self) -> Result<usize> {
        Ok(self.coordinator.sweep_expired(Utc::now()).await?.len())
    }
}
