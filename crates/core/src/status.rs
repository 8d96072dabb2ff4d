//! Service status snapshot published to the control plane

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::progress::ScanProgress;

/// What the service is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Idle,
    Scanning,
    Verifying,
    Monitoring,
}

/// Read-only snapshot of the service, published through a watch channel.
/// Error text lives in its own field, never inside the state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: ServiceState,
    pub progress: Option<ScanProgress>,
    pub last_scan: Option<DateTime<Utc>>,
    pub next_scan: Option<DateTime<Utc>>,
    pub total_movies: usize,
    pub dv_count: usize,
    pub p7_fel_count: usize,
    pub atmos_count: usize,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = state;
        self
    }
}
