//! Download clients for Felarr
//!
//! One implementation: qBittorrent over its Web API v2.

pub mod qbittorrent;


pub use qbittorrent::{QBittorrentClient, QBittorrentConfig};
