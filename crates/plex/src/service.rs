//! Scan orchestration: extractor plus reconciler behind the core seam

use std::sync::Arc;

use async_trait::async_trait;
use felarr_core::{CapabilityStore, Result, ScanRunner, ScanSummary, VerifySummary};
use tokio_util::sync::CancellationToken;

use crate::client::PlexClient;
use crate::collections::{CollectionReconciler, CollectionsConfig, ReconcileMode};
use crate::scanner::{LibraryScanner, ScanOutcome};

/// The Plex side of the system as one unit: scan the library, then bring
/// the curated collections in line.
pub struct PlexService {
    scanner: LibraryScanner,
    reconciler: CollectionReconciler,
    cancel: CancellationToken,
}

impl PlexService {
    pub fn new(
        client: Arc<PlexClient>,
        store: Arc<dyn CapabilityStore>,
        collections: CollectionsConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scanner: LibraryScanner::new(client.clone(), store.clone()),
            reconciler: CollectionReconciler::new(client, store, collections),
            cancel,
        }
    }

    pub fn with_progress(mut self, progress: Arc<felarr_core::ProgressFn>) -> Self {
        self.scanner = self.scanner.with_progress(progress);
        self
    }

    fn summarize(outcome: &ScanOutcome) -> ScanSummary {
        ScanSummary {
            total: outcome.total,
            dv_count: outcome.dv_items.len(),
            p7_fel_count: outcome.p7_fel_items.len(),
            atmos_count: outcome.atmos_items.len(),
            skipped: outcome.skipped,
            collections_added: Vec::new(),
        }
    }
}

#[async_trait]
impl ScanRunner for PlexService {
    async fn run_scan(&self) -> Result<ScanSummary> {
        let outcome = self.scanner.scan_library(&self.cancel).await?;
        let report = self.reconciler.reconcile(ReconcileMode::Scan).await?;

        let mut summary = Self::summarize(&outcome);
        summary.collections_added = report.added_counts;
        Ok(summary)
    }

    async fn run_verify(&self) -> Result<VerifySummary> {
        let outcome = self.scanner.scan_library(&self.cancel).await?;
        let report = self.reconciler.reconcile(ReconcileMode::Verify).await?;

        let mut scan = Self::summarize(&outcome);
        scan.collections_added = report.added_counts;
        Ok(VerifySummary {
            scan,
            removed: report.removed,
        })
    }
}
