//! Capability record: the per-movie fingerprint the scanner maintains

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalised capability fingerprint of one library item, keyed by the
/// stable Plex rating key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub rating_key: String,
    pub title: String,
    pub year: Option<i32>,

    /// Dolby Vision profile as reported by Plex ("5", "7", "8", ...).
    /// `None` means no Dolby Vision.
    pub dv_profile: Option<String>,
    /// Profile 7 with both base and enhancement layer present.
    pub dv_fel: bool,
    /// TrueHD bitstream carrying Atmos.
    pub has_atmos: bool,

    /// Size of the first part, in bytes.
    pub file_size: Option<i64>,
    /// First video stream bitrate in Mbps, one decimal.
    pub video_bitrate: Option<f64>,
    /// Human-readable audio track summary ("TRUEHD Atmos, AC3 5.1").
    pub audio_tracks: Option<String>,

    pub last_updated: DateTime<Utc>,

    /// Free-form extras used by later classification: resolution,
    /// raw bitrate, external ids.
    pub extra: serde_json::Value,
}

impl CapabilityRecord {
    /// Create a record, enforcing that FEL is only ever set on Profile 7.
    pub fn new(rating_key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            rating_key: rating_key.into(),
            title: title.into(),
            year: None,
            dv_profile: None,
            dv_fel: false,
            has_atmos: false,
            file_size: None,
            video_bitrate: None,
            audio_tracks: None,
            last_updated: Utc::now(),
            extra: serde_json::json!({}),
        }
    }

    /// Set the Dolby Vision fields together. The FEL flag is dropped unless
    /// the profile is 7, keeping the record invariant.
    pub fn with_dolby_vision(mut self, profile: Option<String>, fel: bool) -> Self {
        self.dv_fel = fel && profile.as_deref() == Some("7");
        self.dv_profile = profile;
        self
    }

    pub fn has_dv(&self) -> bool {
        self.dv_profile.is_some()
    }

    pub fn is_p7_fel(&self) -> bool {
        self.dv_fel && self.dv_profile.as_deref() == Some("7")
    }

    /// Numeric profile, when Plex reported a plain number.
    pub fn profile_number(&self) -> Option<u8> {
        self.dv_profile.as_deref().and_then(|p| p.parse().ok())
    }

    /// Normalised resolution string from the extras ("2160p"), if known.
    pub fn resolution(&self) -> Option<&str> {
        self.extra.get("resolution").and_then(|v| v.as_str())
    }

    /// Field-wise equality ignoring `last_updated`; an upsert of an
    /// identical record is a no-op.
    pub fn same_capabilities(&self, other: &CapabilityRecord) -> bool {
        self.rating_key == other.rating_key
            && self.title == other.title
            && self.year == other.year
            && self.dv_profile == other.dv_profile
            && self.dv_fel == other.dv_fel
            && self.has_atmos == other.has_atmos
            && self.file_size == other.file_size
            && self.video_bitrate == other.video_bitrate
            && self.audio_tracks == other.audio_tracks
            && self.extra == other.extra
    }
}

/// Predicates the store can answer with its indexed columns. One per
/// curated collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityPredicate {
    /// Any Dolby Vision profile present.
    HasDv,
    /// Profile 7 with full enhancement layer.
    HasP7Fel,
    /// TrueHD Atmos audio.
    HasAtmos,
}

impl CapabilityPredicate {
    pub fn matches(&self, record: &CapabilityRecord) -> bool {
        match self {
            CapabilityPredicate::HasDv => record.has_dv(),
            CapabilityPredicate::HasP7Fel => record.is_p7_fel(),
            CapabilityPredicate::HasAtmos => record.has_atmos,
        }
    }
}
