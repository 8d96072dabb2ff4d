//! Resolution ranking

use serde::{Deserialize, Serialize};

/// Video resolution bucket. Ordering follows the rank table
/// SD < 720p < 1080p < 2160p < 4320p; `Unknown` ranks below everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Unknown,
    Sd480,
    Hd720,
    Fhd1080,
    Uhd2160,
    Uhd4320,
}

impl Resolution {
    /// Normalise a free-form resolution label. Aliases: {4K, UHD, 2160p},
    /// {FHD, Full HD, 1080p}, {HD, 720p}, {SD, 480p}, {8K, 4320p}.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "4320p" | "8k" => Resolution::Uhd4320,
            "2160p" | "4k" | "uhd" | "4k uhd" => Resolution::Uhd2160,
            "1080p" | "1080" | "fhd" | "full hd" => Resolution::Fhd1080,
            "720p" | "720" | "hd" => Resolution::Hd720,
            "480p" | "480" | "576p" | "576" | "sd" => Resolution::Sd480,
            _ => Resolution::Unknown,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Resolution::Unknown => 0,
            Resolution::Sd480 => 1,
            Resolution::Hd720 => 2,
            Resolution::Fhd1080 => 3,
            Resolution::Uhd2160 => 4,
            Resolution::Uhd4320 => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Unknown => "unknown",
            Resolution::Sd480 => "480p",
            Resolution::Hd720 => "720p",
            Resolution::Fhd1080 => "1080p",
            Resolution::Uhd2160 => "2160p",
            Resolution::Uhd4320 => "4320p",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_equivalent() {
        assert_eq!(Resolution::parse("4K"), Resolution::parse("2160p"));
        assert_eq!(Resolution::parse("UHD"), Resolution::Uhd2160);
        assert_eq!(Resolution::parse("Full HD"), Resolution::Fhd1080);
        assert_eq!(Resolution::parse("sd"), Resolution::Sd480);
        assert_eq!(Resolution::parse("whatever"), Resolution::Unknown);
    }

    #[test]
    fn rank_is_strictly_ordered() {
        assert!(Resolution::Uhd2160.rank() > Resolution::Fhd1080.rank());
        assert!(Resolution::Hd720.rank() > Resolution::Sd480.rank());
        assert!(Resolution::Unknown.rank() < Resolution::Sd480.rank());
        // alias ties never count as an upgrade
        assert_eq!(
            Resolution::parse("4k").rank(),
            Resolution::parse("2160p").rank()
        );
    }
}
