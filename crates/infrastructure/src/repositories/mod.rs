//! SQLite repositories implementing the core store traits

pub mod capability;
pub mod history;
pub mod pending;
pub mod settings;

pub use capability::SqliteCapabilityRepository;
pub use history::SqliteHistoryRepository;
pub use pending::SqlitePendingRepository;
pub use settings::SqliteSettingsRepository;
