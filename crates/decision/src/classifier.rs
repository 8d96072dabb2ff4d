//! Upgrade classifier
//!
//! Pure decision function: (current capabilities, candidate sketch, policy)
//! to a notify/skip verdict with a stable reason string. Rules are checked
//! in a fixed order and the first one that fires wins.

use felarr_core::models::{CapabilityRecord, UpgradePolicy};
use serde::{Deserialize, Serialize};

use crate::release::CapabilitySketch;
use crate::resolution::Resolution;

/// Normalised view of what the library currently holds for a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityView {
    pub dv_profile: Option<u8>,
    pub is_fel: bool,
    pub has_atmos: bool,
    pub resolution: Resolution,
}

impl QualityView {
    /// Baseline for movies the library does not own at all.
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn has_dv(&self) -> bool {
        self.dv_profile.is_some()
    }
}

impl From<&CapabilityRecord> for QualityView {
    fn from(record: &CapabilityRecord) -> Self {
        Self {
            dv_profile: record.profile_number(),
            is_fel: record.is_p7_fel(),
            has_atmos: record.has_atmos,
            resolution: record
                .resolution()
                .map(Resolution::parse)
                .unwrap_or_default(),
        }
    }
}

/// Classifier outcome. A skip is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Notify { reason: String },
    Skip { reason: String },
}

impl Verdict {
    fn notify(reason: impl Into<String>) -> Self {
        Verdict::Notify {
            reason: reason.into(),
        }
    }

    fn skip(reason: impl Into<String>) -> Self {
        Verdict::Skip {
            reason: reason.into(),
        }
    }

    pub fn should_notify(&self) -> bool {
        matches!(self, Verdict::Notify { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Verdict::Notify { reason } | Verdict::Skip { reason } => reason,
        }
    }
}

/// Decide whether a candidate release is worth an approval dialogue.
pub fn classify(
    current: &QualityView,
    candidate: &CapabilitySketch,
    policy: &UpgradePolicy,
) -> Verdict {
    // Rule 1: exact duplicate of what the library already holds.
    if current.dv_profile == candidate.dv_profile
        && current.is_fel == candidate.is_fel
        && current.has_atmos == candidate.has_atmos
        && current.resolution.rank() == candidate.resolution.rank()
    {
        return Verdict::skip("already have this exact quality");
    }

    // Rule 2: candidate is Profile 7 FEL.
    if policy.notify_fel && candidate.is_fel {
        if current.is_fel {
            if policy.notify_fel_duplicates {
                return Verdict::notify("additional P7 FEL copy");
            }
            return Verdict::skip("already have P7 FEL");
        }
        if let Some(profile) = current.dv_profile {
            if policy.notify_fel_from_p5 {
                return Verdict::notify(format!("DV P{profile} → P7 FEL"));
            }
        } else if policy.notify_fel_from_hdr {
            return Verdict::notify("HDR/SDR → P7 FEL");
        }
    }

    // Rules 3 and 4: Dolby Vision acquisition and profile upgrades.
    if policy.notify_dv {
        if let Some(new_profile) = candidate.dv_profile {
            match current.dv_profile {
                None if policy.notify_dv_from_hdr => {
                    return Verdict::notify(format!("no DV → DV P{new_profile}"));
                }
                Some(old_profile)
                    if policy.notify_dv_profile_upgrades && new_profile > old_profile =>
                {
                    return Verdict::notify(format!("DV P{old_profile} → P{new_profile}"));
                }
                _ => {}
            }
        }
    }

    // Rule 5: Atmos the library copy lacks.
    if policy.notify_atmos && candidate.has_atmos && !current.has_atmos {
        let dv_profile_upgrade = matches!(
            (current.dv_profile, candidate.dv_profile),
            (Some(old), Some(new)) if new > old
        );
        if dv_profile_upgrade {
            if policy.notify_atmos_with_dv_upgrade {
                return Verdict::notify("combo upgrade DV+Atmos");
            }
        } else if policy.notify_atmos_only_if_no_atmos {
            return Verdict::notify("added Atmos");
        }
    }

    // Rule 6: strictly higher resolution rank.
    if policy.notify_resolution
        && policy.notify_resolution_only_upgrades
        && candidate.resolution.rank() > current.resolution.rank()
    {
        return Verdict::notify(format!(
            "{} → {}",
            current.resolution, candidate.resolution
        ));
    }

    Verdict::skip("not an upgrade per policy")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(
        dv_profile: Option<u8>,
        is_fel: bool,
        has_atmos: bool,
        resolution: Resolution,
    ) -> QualityView {
        QualityView {
            dv_profile,
            is_fel,
            has_atmos,
            resolution,
        }
    }

    fn sketch(
        dv_profile: Option<u8>,
        is_fel: bool,
        has_atmos: bool,
        resolution: Resolution,
    ) -> CapabilitySketch {
        CapabilitySketch {
            dv_profile,
            is_fel,
            has_atmos,
            resolution,
        }
    }

    fn fel_policy() -> UpgradePolicy {
        UpgradePolicy::default()
    }

    fn everything_policy() -> UpgradePolicy {
        UpgradePolicy {
            notify_dv: true,
            notify_atmos: true,
            notify_resolution: true,
            ..UpgradePolicy::default()
        }
    }

    #[test]
    fn exact_duplicate_always_skips() {
        // holds for every policy, including the most permissive one
        for policy in [fel_policy(), everything_policy()] {
            let current = view(Some(7), true, true, Resolution::Uhd2160);
            let candidate = sketch(Some(7), true, true, Resolution::Uhd2160);
            let verdict = classify(&current, &candidate, &policy);
            assert_eq!(verdict, Verdict::skip("already have this exact quality"));
        }
    }

    #[test]
    fn duplicate_matches_across_resolution_aliases() {
        let current = view(Some(5), false, false, Resolution::parse("4k"));
        let candidate = sketch(Some(5), false, false, Resolution::parse("2160p"));
        assert!(!classify(&current, &candidate, &everything_policy()).should_notify());
    }

    #[test]
    fn p5_to_fel_notifies() {
        let current = view(Some(5), false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(7), true, true, Resolution::Uhd2160);
        let verdict = classify(&current, &candidate, &fel_policy());
        assert_eq!(verdict, Verdict::notify("DV P5 → P7 FEL"));
    }

    #[test]
    fn hdr_to_fel_notifies() {
        let current = view(None, false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(7), true, false, Resolution::Uhd2160);
        let verdict = classify(&current, &candidate, &fel_policy());
        assert_eq!(verdict, Verdict::notify("HDR/SDR → P7 FEL"));
    }

    #[test]
    fn fel_to_fel_skips_unless_duplicates_wanted() {
        let current = view(Some(7), true, false, Resolution::Uhd2160);
        let candidate = sketch(Some(7), true, true, Resolution::Uhd2160);

        let verdict = classify(&current, &candidate, &fel_policy());
        assert_eq!(verdict, Verdict::skip("already have P7 FEL"));

        let policy = UpgradePolicy {
            notify_fel_duplicates: true,
            ..fel_policy()
        };
        let verdict = classify(&current, &candidate, &policy);
        assert_eq!(verdict, Verdict::notify("additional P7 FEL copy"));
    }

    #[test]
    fn fel_sub_flags_gate_their_paths() {
        let policy = UpgradePolicy {
            notify_fel_from_p5: false,
            notify_fel_from_hdr: false,
            ..fel_policy()
        };

        let current = view(Some(5), false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(7), true, false, Resolution::Uhd2160);
        assert!(!classify(&current, &candidate, &policy).should_notify());

        let current = view(None, false, false, Resolution::Uhd2160);
        assert!(!classify(&current, &candidate, &policy).should_notify());
    }

    #[test]
    fn dv_acquisition_requires_master_gate() {
        let current = view(None, false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(5), false, false, Resolution::Uhd2160);

        // default policy keeps notify_dv off
        assert!(!classify(&current, &candidate, &fel_policy()).should_notify());

        let verdict = classify(&current, &candidate, &everything_policy());
        assert_eq!(verdict, Verdict::notify("no DV → DV P5"));
    }

    #[test]
    fn dv_profile_upgrade_compares_numerically() {
        let current = view(Some(5), false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(8), false, false, Resolution::Uhd2160);
        let verdict = classify(&current, &candidate, &everything_policy());
        assert_eq!(verdict, Verdict::notify("DV P5 → P8"));

        // downgrade never fires
        let current = view(Some(8), false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(5), false, false, Resolution::Uhd2160);
        assert!(!classify(&current, &candidate, &everything_policy()).should_notify());
    }

    #[test]
    fn atmos_combo_upgrade() {
        let current = view(Some(5), false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(7), false, true, Resolution::Uhd2160);
        let policy = UpgradePolicy {
            notify_atmos: true,
            ..fel_policy()
        };
        let verdict = classify(&current, &candidate, &policy);
        assert_eq!(verdict, Verdict::notify("combo upgrade DV+Atmos"));
    }

    #[test]
    fn standalone_atmos_addition() {
        let current = view(Some(5), false, false, Resolution::Uhd2160);
        let candidate = sketch(Some(5), false, true, Resolution::Uhd2160);
        let policy = UpgradePolicy {
            notify_atmos: true,
            ..fel_policy()
        };
        let verdict = classify(&current, &candidate, &policy);
        assert_eq!(verdict, Verdict::notify("added Atmos"));
    }

    #[test]
    fn atmos_never_fires_when_library_already_has_it() {
        let current = view(Some(5), false, true, Resolution::Uhd2160);
        let candidate = sketch(Some(5), false, true, Resolution::Fhd1080);
        let policy = UpgradePolicy {
            notify_atmos: true,
            ..fel_policy()
        };
        assert!(!classify(&current, &candidate, &policy).should_notify());
    }

    #[test]
    fn resolution_upgrade_is_strict() {
        let policy = UpgradePolicy {
            notify_resolution: true,
            ..fel_policy()
        };

        let current = view(None, false, false, Resolution::Fhd1080);
        let candidate = sketch(None, false, false, Resolution::Uhd2160);
        let verdict = classify(&current, &candidate, &policy);
        assert_eq!(verdict, Verdict::notify("1080p → 2160p"));

        // equal rank must not fire
        let candidate = sketch(None, false, true, Resolution::Fhd1080);
        let policy_quiet = UpgradePolicy {
            notify_resolution: true,
            notify_atmos: false,
            ..fel_policy()
        };
        assert!(!classify(&current, &candidate, &policy_quiet).should_notify());
    }

    #[test]
    fn fallback_reason_is_stable() {
        let current = view(Some(7), true, true, Resolution::Uhd2160);
        let candidate = sketch(Some(5), false, false, Resolution::Fhd1080);
        let verdict = classify(&current, &candidate, &fel_policy());
        assert_eq!(verdict, Verdict::skip("not an upgrade per policy"));
    }

    #[test]
    fn empty_baseline_treats_everything_as_new() {
        // the synthesised "own nothing" record used when
        // notify_only_library_movies is off
        let current = QualityView::nothing();
        let candidate = sketch(Some(7), true, true, Resolution::Uhd2160);
        assert!(classify(&current, &candidate, &fel_policy()).should_notify());
    }

    #[test]
    fn classify_against_capability_record() {
        let mut record = felarr_core::models::CapabilityRecord::new("1", "Dune")
            .with_dolby_vision(Some("5".to_string()), false);
        record.extra = serde_json::json!({"resolution": "2160p"});

        let current = QualityView::from(&record);
        assert_eq!(current.dv_profile, Some(5));
        assert_eq!(current.resolution, Resolution::Uhd2160);

        let candidate = crate::release::parse_sketch("Dune 2021 2160p DV FEL Atmos");
        let verdict = classify(&current, &candidate, &fel_policy());
        assert_eq!(verdict, Verdict::notify("DV P5 → P7 FEL"));
    }
}
