//! Library scanner
//!
//! Walks the configured Plex movie section in fixed-size batches, fetching
//! per-item metadata concurrently under a global in-flight cap, and upserts
//! a capability record per item. Per-item failures are skipped; the item
//! keeps its previous record. A batch where every request dies on transport
//! aborts the scan, since the server is plainly unreachable.

use std::sync::Arc;

use felarr_core::{
    CapabilityRecord, CapabilityStore, FelarrError, ProgressFn, Result, ScanProgress,
};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::PlexClient;
use crate::xml;

/// Items per batch.
const BATCH_SIZE: usize = 50;
/// Global cap on in-flight metadata requests.
const MAX_IN_FLIGHT: usize = 20;

/// Snapshot lists captured during one scan. Later scans may rewrite the
/// store records; these lists stay as they were observed.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub total: usize,
    pub skipped: usize,
    pub dv_items: Vec<CapabilityRecord>,
    pub p7_fel_items: Vec<CapabilityRecord>,
    pub atmos_items: Vec<CapabilityRecord>,
}

pub struct LibraryScanner {
    client: Arc<PlexClient>,
    store: Arc<dyn CapabilityStore>,
    semaphore: Arc<Semaphore>,
    progress: Option<Arc<ProgressFn>>,
}

enum ItemFetch {
    Parsed(Box<xml::MediaInfo>),
    Skipped,
    TransportFailure,
}

impl LibraryScanner {
    pub fn new(client: Arc<PlexClient>, store: Arc<dyn CapabilityStore>) -> Self {
        Self {
            client,
            store,
            semaphore: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Scan the whole library. Cancellation is honoured between batches;
    /// in-flight requests of the current batch are allowed to finish.
    pub async fn scan_library(&self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let section_key = self.client.section_key().await?;
        let listing = self.client.list_section(&section_key).await?;
        let total = listing.len();
        info!(
            library = self.client.library_name(),
            total, "scanning library for capability metadata"
        );

        let mut outcome = ScanOutcome {
            total,
            ..ScanOutcome::default()
        };
        let mut processed = 0usize;

        for batch in listing.chunks(BATCH_SIZE) {
            if cancel.is_cancelled() {
                info!(processed, total, "scan cancelled between batches");
                return Err(FelarrError::Cancelled);
            }

            let fetches = join_all(batch.iter().map(|item| self.fetch_item(&item.rating_key)));
            let results = fetches.await;

            let transport_failures = results
                .iter()
                .filter(|r| matches!(r, ItemFetch::TransportFailure))
                .count();
            if !batch.is_empty() && transport_failures == batch.len() {
                return Err(FelarrError::transport(
                    "plex",
                    "entire metadata batch failed; server unreachable",
                ));
            }

            for result in results {
                match result {
                    ItemFetch::Parsed(info) => {
                        let record = info.into_record();
                        self.store.upsert_capability(&record).await?;
                        if record.has_dv() {
                            outcome.dv_items.push(record.clone());
                        }
                        if record.is_p7_fel() {
                            outcome.p7_fel_items.push(record.clone());
                        }
                        if record.has_atmos {
                            outcome.atmos_items.push(record);
                        }
                    }
                    ItemFetch::Skipped | ItemFetch::TransportFailure => {
                        outcome.skipped += 1;
                    }
                }
            }

            processed += batch.len();
            if let Some(progress) = &self.progress {
                (progress.as_ref())(ScanProgress { processed, total });
            }
        }

        info!(
            dv = outcome.dv_items.len(),
            p7_fel = outcome.p7_fel_items.len(),
            atmos = outcome.atmos_items.len(),
            skipped = outcome.skipped,
            "scan finished"
        );
        Ok(outcome)
    }

    /// Fetch and parse one item under the global semaphore. Protocol and
    /// parse failures skip the item; transport failures are tallied so the
    /// batch can distinguish a dead server from a flaky item.
    async fn fetch_item(&self, rating_key: &str) -> ItemFetch {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("scan semaphore closed");

        let body = match self.client.item_metadata(rating_key).await {
            Ok(body) => body,
            Err(FelarrError::Transport { error, .. }) => {
                warn!(rating_key, %error, "metadata fetch transport failure");
                return ItemFetch::TransportFailure;
            }
            Err(err) => {
                warn!(rating_key, %err, "metadata fetch failed; keeping previous record");
                return ItemFetch::Skipped;
            }
        };

        match xml::parse_metadata(&body) {
            Ok(mut items) if !items.is_empty() => ItemFetch::Parsed(Box::new(items.remove(0))),
            Ok(_) => {
                debug!(rating_key, "metadata document had no video element");
                ItemFetch::Skipped
            }
            Err(err) => {
                warn!(rating_key, %err, "metadata parse failed; keeping previous record");
                ItemFetch::Skipped
            }
        }
    }
}
