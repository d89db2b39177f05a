//! Trust camera policy: which devices take manual constraints, and the
//! per-attribute defaults and limits used when they do.

use camcaps::{Attribute, CapabilityRange};

/// Case-insensitive label marker of the manually controllable family.
pub const TRUST_MARKER: &str = "trust";

/// Whether the device label identifies a manually controllable camera.
pub fn is_manual_capable(label: &str) -> bool {
    label.to_lowercase().contains(TRUST_MARKER)
}

/// Starting value for a manual attribute on a Trust camera.
pub fn manual_default(attribute: Attribute) -> Option<f64> {
    match attribute {
        Attribute::FocusDistance => Some(250.0),
        Attribute::ExposureTime => Some(600.0),
        Attribute::Brightness => Some(50.0),
        Attribute::Contrast => Some(50.0),
        Attribute::ExposureCompensation => Some(40.0),
        _ => None,
    }
}

/// Operator-facing bounds applied before the hardware range.
pub fn manual_limit(attribute: Attribute) -> Option<CapabilityRange> {
    let (min, max) = match attribute {
        Attribute::FocusDistance => (0.0, 1023.0),
        Attribute::ExposureTime => (1.0, 10000.0),
        Attribute::Brightness => (-64.0, 64.0),
        Attribute::Contrast => (0.0, 100.0),
        Attribute::ExposureCompensation => (0.0, 128.0),
        _ => return None,
    };
    Some(CapabilityRange::bounded(min, max))
}
