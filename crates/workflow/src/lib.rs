//! Download coordination and scheduling
//!
//! The coordinator drives one tracker discovery through parsing,
//! classification, approval and dispatch; the monitor loop owns the
//! periodic scans, tracker polls and sweeps. Everything external is
//! reached through the seams defined in `felarr-core`, so this crate holds
//! the workflow logic and nothing else.

pub mod coordinator;
pub mod monitor;
pub mod render;
pub mod services;
pub mod state;

pub use coordinator::{DiscoveryOutcome, DownloadCoordinator};
pub use monitor::{MonitorConfig, MonitorLoop};
pub use services::CoreServices;
pub use state::StateView;
