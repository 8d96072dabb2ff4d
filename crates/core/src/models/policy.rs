//! Upgrade notification policy

use serde::{Deserialize, Serialize};

/// Which candidate releases are worth interrupting the operator for.
///
/// Every flag gates one rule of the upgrade classifier; defaults favour
/// Profile 7 FEL hunting and stay quiet about everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradePolicy {
    /// Master gate for FEL candidate rules.
    pub notify_fel: bool,
    /// DV P5/P8 owner sees a P7 FEL release.
    pub notify_fel_from_p5: bool,
    /// HDR10/SDR owner sees a P7 FEL release.
    pub notify_fel_from_hdr: bool,
    /// Notify even when the library copy is already P7 FEL.
    pub notify_fel_duplicates: bool,

    /// Master gate for the non-FEL Dolby Vision rules.
    pub notify_dv: bool,
    /// No-DV owner sees any DV release.
    pub notify_dv_from_hdr: bool,
    /// Both sides DV, candidate profile strictly higher.
    pub notify_dv_profile_upgrades: bool,

    /// Master gate for the Atmos rules.
    pub notify_atmos: bool,
    /// Atmos arriving together with a DV profile upgrade.
    pub notify_atmos_with_dv_upgrade: bool,
    /// Standalone Atmos addition when the library copy has none.
    pub notify_atmos_only_if_no_atmos: bool,

    /// Master gate for resolution rules.
    pub notify_resolution: bool,
    /// Only strictly higher resolution ranks notify.
    pub notify_resolution_only_upgrades: bool,

    /// Skip discoveries for movies that are not in the library. When false
    /// the coordinator classifies against an empty baseline instead.
    pub notify_only_library_movies: bool,

    /// How long an approval request stays actionable.
    pub notify_expire_hours: i64,
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        Self {
            notify_fel: true,
            notify_fel_from_p5: true,
            notify_fel_from_hdr: true,
            notify_fel_duplicates: false,
            notify_dv: false,
            notify_dv_from_hdr: true,
            notify_dv_profile_upgrades: true,
            notify_atmos: false,
            notify_atmos_with_dv_upgrade: true,
            notify_atmos_only_if_no_atmos: true,
            notify_resolution: false,
            notify_resolution_only_upgrades: true,
            notify_only_library_movies: true,
            notify_expire_hours: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_track_fel_only() {
        let policy = UpgradePolicy::default();
        assert!(policy.notify_fel);
        assert!(!policy.notify_dv);
        assert!(!policy.notify_atmos);
        assert!(!policy.notify_resolution);
        assert_eq!(policy.notify_expire_hours, 24);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let policy: UpgradePolicy =
            serde_json::from_str(r#"{"notify_atmos": true, "notify_expire_hours": 6}"#).unwrap();
        assert!(policy.notify_atmos);
        assert_eq!(policy.notify_expire_hours, 6);
        assert!(policy.notify_fel);
    }
}
