//! Radarr v3 API integration

pub mod client;
pub mod models;

pub use client::{RadarrClient, RadarrConfig};
pub use models::{QualityProfile, RadarrMovie, RadarrRelease, RootFolder};
