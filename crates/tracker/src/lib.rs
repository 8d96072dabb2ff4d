//! Release tracker polling client
//!
//! In-process replacement for the external scraper: polls the tracker's
//! advanced-search page over HTTP with session cookies and yields release
//! records. The rest of the system consumes only the `ReleaseSource`
//! boundary; nothing downstream knows how the records were obtained.

pub mod client;
pub mod parser;

pub use client::{TrackerClient, TrackerConfig};
