//! Application configuration
//!
//! Everything comes from flags or environment variables; `.env` files are
//! honoured for local development.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "felarr",
    about = "Plex Dolby Vision / Atmos library curator with tracker-driven upgrade downloads"
)]
pub struct AppConfig {
    /// SQLite database URL.
    #[arg(long, env = "FELARR_DATABASE_URL", default_value = "sqlite://felarr.db")]
    pub database_url: String,

    /// Control-plane listen address.
    #[arg(long, env = "FELARR_LISTEN", default_value = "127.0.0.1:8090")]
    pub listen: String,

    // -- Plex --
    #[arg(long, env = "PLEX_URL", default_value = "http://localhost:32400")]
    pub plex_url: String,

    #[arg(long, env = "PLEX_TOKEN")]
    pub plex_token: String,

    #[arg(long, env = "PLEX_LIBRARY", default_value = "Movies")]
    pub plex_library: String,

    /// Collection names; an empty string disables that collection.
    #[arg(long, env = "COLLECTION_ALL_DV", default_value = "All Dolby Vision")]
    pub collection_all_dv: String,

    #[arg(long, env = "COLLECTION_P7_FEL", default_value = "DV P7 FEL")]
    pub collection_p7_fel: String,

    #[arg(long, env = "COLLECTION_ATMOS", default_value = "TrueHD Atmos")]
    pub collection_atmos: String,

    // -- Radarr --
    #[arg(long, env = "RADARR_URL", default_value = "http://localhost:7878")]
    pub radarr_url: String,

    #[arg(long, env = "RADARR_API_KEY")]
    pub radarr_api_key: String,

    // -- qBittorrent --
    #[arg(long, env = "QBIT_URL", default_value = "http://localhost:8080")]
    pub qbit_url: String,

    /// Empty credentials select LAN mode (no login).
    #[arg(long, env = "QBIT_USERNAME", default_value = "")]
    pub qbit_username: String,

    #[arg(long, env = "QBIT_PASSWORD", default_value = "")]
    pub qbit_password: String,

    // -- Telegram --
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: String,

    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: String,

    // -- Tracker --
    #[arg(long, env = "TRACKER_URL", default_value = "https://iptorrents.com")]
    pub tracker_url: String,

    #[arg(long, env = "TRACKER_SEARCH_TERM", default_value = "BL+EL+RPU")]
    pub tracker_search_term: String,

    #[arg(long, env = "TRACKER_UID", default_value = "")]
    pub tracker_uid: String,

    #[arg(long, env = "TRACKER_PASS", default_value = "")]
    pub tracker_pass: String,

    // -- Scheduling --
    #[arg(long, env = "SCAN_FREQUENCY_HOURS", default_value_t = 24)]
    pub scan_frequency_hours: i64,

    #[arg(long, env = "TRACKER_POLL_MINUTES", default_value_t = 120)]
    pub tracker_poll_minutes: i64,
}

impl AppConfig {
    fn optional(name: &str) -> Option<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn collections(&self) -> felarr_plex::CollectionsConfig {
        felarr_plex::CollectionsConfig {
            all_dv: Self::optional(&self.collection_all_dv),
            profile7_fel: Self::optional(&self.collection_p7_fel),
            truehd_atmos: Self::optional(&self.collection_atmos),
        }
    }
}
