//! Plex integration: metadata extraction and collection curation
//!
//! Talks to one Plex server over its XML API. The scanner walks the
//! configured movie section in concurrent batches and distils each item
//! into a capability record; the reconciler keeps the curated collections
//! in step with what the store says they should contain.

pub mod client;
pub mod collections;
pub mod scanner;
pub mod service;
pub mod xml;

pub use client::{PlexClient, PlexConfig};
pub use collections::{CollectionReconciler, CollectionsConfig, ReconcileMode, ReconcileReport};
pub use scanner::{LibraryScanner, ScanOutcome};
pub use service::PlexService;
