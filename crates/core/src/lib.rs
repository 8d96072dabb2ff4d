//! Core domain models and business logic for Felarr
//!
//! This crate contains the fundamental domain models, the error taxonomy,
//! and the store/client traits that the other crates implement.

pub mod domain;
pub mod error;
pub mod models;
pub mod progress;
pub mod status;

// Re-export core types
pub use domain::*;
pub use error::*;
pub use models::*;
pub use progress::{ProgressFn, ScanProgress};
pub use status::{ServiceState, StatusSnapshot};
