//! Quality block rendering for the approval dialogue

use felarr_core::CapabilityRecord;
use felarr_decision::{CapabilitySketch, Resolution};

/// Render the library's current holdings as bullet lines.
pub fn render_current_quality(record: Option<&CapabilityRecord>) -> String {
    let Some(record) = record else {
        return "• Not in library".to_string();
    };

    let mut lines = Vec::new();

    match &record.dv_profile {
        Some(profile) => {
            let layer = if record.dv_fel { " FEL" } else { " MEL" };
            lines.push(format!("• DV Profile {}{}", profile, layer));
        }
        None => lines.push("• HDR10 / SDR".to_string()),
    }

    if let Some(size) = record.file_size {
        lines.push(format!("• {:.1} GB", size as f64 / 1024f64.powi(3)));
    }

    if let Some(bitrate) = record.video_bitrate {
        lines.push(format!("• {:.1} Mbps", bitrate));
    }

    if let Some(resolution) = record.resolution() {
        if resolution != "unknown" {
            lines.push(format!("• {}", resolution));
        }
    }

    if record.has_atmos {
        lines.push("• TrueHD Atmos ✓".to_string());
    }

    lines.join("\n")
}

/// Render a candidate sketch as bullet lines.
pub fn render_candidate_quality(sketch: &CapabilitySketch) -> String {
    let mut lines = Vec::new();

    match sketch.dv_profile {
        Some(profile) if sketch.is_fel => {
            lines.push(format!("• DV Profile {} FEL (BL+EL+RPU)", profile));
        }
        Some(profile) => lines.push(format!("• DV Profile {}", profile)),
        None => lines.push("• HDR10".to_string()),
    }

    if sketch.resolution != Resolution::Unknown {
        lines.push(format!("• {}", sketch.resolution));
    }

    if sketch.has_atmos {
        lines.push("• TrueHD Atmos ✓".to_string());
    }

    lines.push("• From tracker".to_string());
    lines.join("\n")
}
