//! Release-title parsing
//!
//! Derives a partial capability sketch and a movie title/year pair from a
//! free-form tracker release title. Matching is case-insensitive and
//! token-bounded so "DVDRip" never reads as Dolby Vision.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::resolution::Resolution;

/// Capability-shaped record derived from a release title; several fields
/// may be unknown. Used only for comparison against library records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySketch {
    pub dv_profile: Option<u8>,
    pub is_fel: bool,
    pub has_atmos: bool,
    pub resolution: Resolution,
}

impl CapabilitySketch {
    pub fn has_dv(&self) -> bool {
        self.dv_profile.is_some()
    }

    /// Stable string form feeding the request-id hash and the dedupe key.
    pub fn fingerprint(&self) -> String {
        format!(
            "p{}/{}/{}/{}",
            self.dv_profile
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            if self.is_fel { "fel" } else { "mel" },
            if self.has_atmos { "atmos" } else { "noatmos" },
            self.resolution
        )
    }
}

/// Movie title and year recovered from a release name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTitle {
    pub title: String,
    pub year: i32,
}

static TITLE_YEAR_DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)[.\s]+(\d{4})[.\s]").unwrap());
static TITLE_YEAR_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s+(\d{4})").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Extract title and year. Dotted separators are collapsed to spaces and
/// whitespace runs squeezed. Titles without a recognisable year are
/// rejected: the caller cannot match them against the library.
pub fn parse_release_title(release: &str) -> Option<ParsedTitle> {
    let captures = TITLE_YEAR_DOTTED
        .captures(release)
        .or_else(|| TITLE_YEAR_PLAIN.captures(release))?;

    let raw_title = captures.get(1)?.as_str().replace('.', " ");
    let title = WHITESPACE_RUN
        .replace_all(raw_title.trim(), " ")
        .to_string();
    let year: i32 = captures.get(2)?.as_str().parse().ok()?;

    if title.is_empty() {
        return None;
    }

    Some(ParsedTitle { title, year })
}

static PROFILE_7: Lazy<Regex> = Lazy::new(|| token_regex(&["PROFILE 7", "PROFILE7", "P7"]));
static FEL_MARKERS: Lazy<Regex> = Lazy::new(|| token_regex(&["FEL", "BL\\+EL", "BL EL"]));
static PROFILE_DIGIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Za-z0-9])(?:PROFILE ?|P)([58])(?:$|[^A-Za-z0-9])").unwrap());
static DV_GENERIC: Lazy<Regex> = Lazy::new(|| token_regex(&["DOLBY VISION", "DOVI", "DV"]));
static ATMOS: Lazy<Regex> = Lazy::new(|| token_regex(&["ATMOS"]));
static RES_2160: Lazy<Regex> = Lazy::new(|| token_regex(&["2160P", "4K", "UHD"]));
static RES_1080: Lazy<Regex> = Lazy::new(|| token_regex(&["1080P", "FHD"]));
static RES_720: Lazy<Regex> = Lazy::new(|| token_regex(&["720P", "HD"]));
static RES_480: Lazy<Regex> = Lazy::new(|| token_regex(&["480P", "SD"]));

/// Alternation of tokens that must not touch an adjacent letter or digit,
/// so "DV" cannot fire inside "DVDRip".
fn token_regex(tokens: &[&str]) -> Regex {
    let alternation = tokens.join("|");
    Regex::new(&format!(
        r"(?:^|[^A-Za-z0-9])(?:{alternation})(?:$|[^A-Za-z0-9])"
    ))
    .unwrap()
}

/// Derive the capability sketch from a release title. First match wins per
/// field; a bare Dolby Vision mention defaults to Profile 5, the most
/// common single-layer encode.
pub fn parse_sketch(release: &str) -> CapabilitySketch {
    let upper = release.to_uppercase();
    let mut sketch = CapabilitySketch::default();

    if PROFILE_7.is_match(&upper) {
        sketch.dv_profile = Some(7);
    }

    if FEL_MARKERS.is_match(&upper) {
        sketch.is_fel = true;
        // FEL implies Profile 7
        sketch.dv_profile.get_or_insert(7);
    }

    if sketch.dv_profile.is_none() {
        if let Some(captures) = PROFILE_DIGIT.captures(&upper) {
            sketch.dv_profile = captures.get(1).and_then(|m| m.as_str().parse().ok());
        } else if DV_GENERIC.is_match(&upper) {
            sketch.dv_profile = Some(5);
        }
    }

    sketch.has_atmos = ATMOS.is_match(&upper);

    sketch.resolution = if RES_2160.is_match(&upper) {
        Resolution::Uhd2160
    } else if RES_1080.is_match(&upper) {
        Resolution::Fhd1080
    } else if RES_720.is_match(&upper) {
        Resolution::Hd720
    } else if RES_480.is_match(&upper) {
        Resolution::Sd480
    } else {
        Resolution::Unknown
    };

    sketch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_release_names() {
        let parsed = parse_release_title("Dune.Part.Two.2024.2160p.UHD.BluRay.DV.FEL").unwrap();
        assert_eq!(parsed.title, "Dune Part Two");
        assert_eq!(parsed.year, 2024);
    }

    #[test]
    fn parses_space_separated_names() {
        let parsed = parse_release_title("Dune 2021 2160p DV FEL Atmos").unwrap();
        assert_eq!(parsed.title, "Dune");
        assert_eq!(parsed.year, 2021);
    }

    #[test]
    fn rejects_titles_without_year() {
        assert_eq!(parse_release_title("Dune Extended Cut 2160p"), None);
        assert_eq!(parse_release_title(""), None);
    }

    #[test]
    fn squeezes_whitespace_runs() {
        let parsed = parse_release_title("The  Matrix   1999 1080p").unwrap();
        assert_eq!(parsed.title, "The Matrix");
    }

    #[test]
    fn fel_tokens_imply_profile_7() {
        let sketch = parse_sketch("Movie 2020 2160p BL+EL+RPU Remux");
        assert_eq!(sketch.dv_profile, Some(7));
        assert!(sketch.is_fel);

        let sketch = parse_sketch("Movie 2020 2160p DV FEL");
        assert_eq!(sketch.dv_profile, Some(7));
        assert!(sketch.is_fel);
    }

    #[test]
    fn profile_7_without_fel_marker_is_not_fel() {
        let sketch = parse_sketch("Movie 2020 2160p DV Profile 7 MEL");
        assert_eq!(sketch.dv_profile, Some(7));
        assert!(!sketch.is_fel);
    }

    #[test]
    fn explicit_profile_digits_win_over_generic_dv() {
        let sketch = parse_sketch("Movie 2020 2160p Dolby Vision P5");
        assert_eq!(sketch.dv_profile, Some(5));

        let sketch = parse_sketch("Movie 2020 2160p DV Profile 8 HDR10");
        assert_eq!(sketch.dv_profile, Some(8));
    }

    #[test]
    fn generic_dv_defaults_to_profile_5() {
        let sketch = parse_sketch("Movie 2020 2160p DoVi HDR10 x265");
        assert_eq!(sketch.dv_profile, Some(5));
        assert!(!sketch.is_fel);
    }

    #[test]
    fn dvdrip_is_not_dolby_vision() {
        let sketch = parse_sketch("Movie 2002 DVDRip XviD");
        assert_eq!(sketch.dv_profile, None);
    }

    #[test]
    fn atmos_detection() {
        assert!(parse_sketch("Movie 2020 TrueHD Atmos 7.1").has_atmos);
        assert!(!parse_sketch("Movie 2020 DTS-HD MA 5.1").has_atmos);
    }

    #[test]
    fn resolution_buckets() {
        assert_eq!(parse_sketch("Movie 2020 2160p").resolution, Resolution::Uhd2160);
        assert_eq!(parse_sketch("Movie 2020 4K UHD").resolution, Resolution::Uhd2160);
        assert_eq!(parse_sketch("Movie 2020 1080p").resolution, Resolution::Fhd1080);
        assert_eq!(parse_sketch("Movie 2020 720p").resolution, Resolution::Hd720);
        assert_eq!(parse_sketch("Movie 2020 480p").resolution, Resolution::Sd480);
        assert_eq!(parse_sketch("Movie 2020 BluRay").resolution, Resolution::Unknown);
    }

    #[test]
    fn fingerprint_is_stable() {
        let sketch = parse_sketch("Dune 2021 2160p DV FEL Atmos");
        assert_eq!(sketch.fingerprint(), "p7/fel/atmos/2160p");
        assert_eq!(
            parse_sketch("Plain 2020 1080p").fingerprint(),
            "p-/mel/noatmos/1080p"
        );
    }
}
