//! Progress reporting for library scans

use serde::{Deserialize, Serialize};

/// Snapshot emitted after each scan batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
}

impl ScanProgress {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f32 / self.total as f32) * 100.0
    }
}

/// Callback handed to the scanner; invoked between batches.
pub type ProgressFn = dyn Fn(ScanProgress) + Send + Sync;
