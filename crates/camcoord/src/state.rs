//! Desired and applied camera state records.

use camcaps::{Attribute, Capabilities, ManualMode};
use serde::{Deserialize, Serialize};

/// Partial record of camera attributes.
///
/// Used for the desired state, for patches merged into it, and for the
/// settings a track reports back. `None` means "not requested" (or "not
/// reported" for track settings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_mode: Option<ManualMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<ManualMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_balance_mode: Option<ManualMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_compensation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
}

/// The user's latest requested settings, independent of what hardware accepted.
pub type DesiredCameraState = CameraSettings;

impl CameraSettings {
    /// Desired state a coordinator starts from: every mode manual.
    pub fn manual_modes() -> Self {
        Self {
            exposure_mode: Some(ManualMode::Manual),
            focus_mode: Some(ManualMode::Manual),
            white_balance_mode: Some(ManualMode::Manual),
            ..Self::default()
        }
    }

    /// Mode value for a mode attribute; `None` for numeric attributes.
    pub fn mode(&self, attribute: Attribute) -> Option<ManualMode> {
        match attribute {
            Attribute::ExposureMode => self.exposure_mode,
            Attribute::FocusMode => self.focus_mode,
            Attribute::WhiteBalanceMode => self.white_balance_mode,
            _ => None,
        }
    }

    /// Numeric value for a numeric attribute; `None` for mode attributes.
    pub fn numeric(&self, attribute: Attribute) -> Option<f64> {
        match attribute {
            Attribute::ExposureTime => self.exposure_time,
            Attribute::FocusDistance => self.focus_distance,
            Attribute::ColorTemperature => self.color_temperature,
            Attribute::Brightness => self.brightness,
            Attribute::Contrast => self.contrast,
            Attribute::ExposureCompensation => self.exposure_compensation,
            Attribute::Width => self.width,
            Attribute::Height => self.height,
            Attribute::FrameRate => self.frame_rate,
            Attribute::ExposureMode | Attribute::FocusMode | Attribute::WhiteBalanceMode => None,
        }
    }

    fn mode_slot(&mut self, attribute: Attribute) -> Option<&mut Option<ManualMode>> {
        match attribute {
            Attribute::ExposureMode => Some(&mut self.exposure_mode),
            Attribute::FocusMode => Some(&mut self.focus_mode),
            Attribute::WhiteBalanceMode => Some(&mut self.white_balance_mode),
            _ => None,
        }
    }

    fn numeric_slot(&mut self, attribute: Attribute) -> Option<&mut Option<f64>> {
        match attribute {
            Attribute::ExposureTime => Some(&mut self.exposure_time),
            Attribute::FocusDistance => Some(&mut self.focus_distance),
            Attribute::ColorTemperature => Some(&mut self.color_temperature),
            Attribute::Brightness => Some(&mut self.brightness),
            Attribute::Contrast => Some(&mut self.contrast),
            Attribute::ExposureCompensation => Some(&mut self.exposure_compensation),
            Attribute::Width => Some(&mut self.width),
            Attribute::Height => Some(&mut self.height),
            Attribute::FrameRate => Some(&mut self.frame_rate),
            Attribute::ExposureMode | Attribute::FocusMode | Attribute::WhiteBalanceMode => None,
        }
    }

    /// Set a mode attribute; ignored for numeric attributes.
    pub fn set_mode(&mut self, attribute: Attribute, mode: Option<ManualMode>) {
        if let Some(slot) = self.mode_slot(attribute) {
            *slot = mode;
        }
    }

    /// Set a numeric attribute; ignored for mode attributes.
    pub fn set_numeric(&mut self, attribute: Attribute, value: Option<f64>) {
        if let Some(slot) = self.numeric_slot(attribute) {
            *slot = value;
        }
    }

    /// Builder-style [`CameraSettings::set_mode`].
    pub fn with_mode(mut self, attribute: Attribute, mode: ManualMode) -> Self {
        self.set_mode(attribute, Some(mode));
        self
    }

    /// Builder-style [`CameraSettings::set_numeric`].
    pub fn with(mut self, attribute: Attribute, value: f64) -> Self {
        self.set_numeric(attribute, Some(value));
        self
    }

    /// Shallow merge: every attribute present in `patch` overrides `self`.
    pub fn merge(&mut self, patch: &CameraSettings) {
        for attribute in Attribute::ALL {
            if attribute.is_mode() {
                if let Some(mode) = patch.mode(attribute) {
                    self.set_mode(attribute, Some(mode));
                }
            } else if let Some(value) = patch.numeric(attribute) {
                self.set_numeric(attribute, Some(value));
            }
        }
    }

    /// Clamp every numeric attribute against the capability snapshot.
    pub fn clamp_to(&mut self, caps: &Capabilities) {
        for attribute in Attribute::ALL {
            if !attribute.is_mode() {
                let clamped = caps.clamp(attribute, self.numeric(attribute));
                self.set_numeric(attribute, clamped);
            }
        }
    }

    /// Whether no attribute is set.
    pub fn is_empty(&self) -> bool {
        *self == CameraSettings::default()
    }
}

/// Best-known actual hardware settings after the last apply attempt.
///
/// Always complete: every attribute carries a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCameraState {
    pub exposure_mode: ManualMode,
    pub exposure_time: f64,
    pub focus_mode: ManualMode,
    pub focus_distance: f64,
    pub white_balance_mode: ManualMode,
    pub color_temperature: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub exposure_compensation: f64,
    pub width: f64,
    pub height: f64,
    pub frame_rate: f64,
}

impl AppliedCameraState {
    /// Combine reported settings with the desired record.
    ///
    /// Reported values win; the desired value fills gaps; `manual` / `0`
    /// fill whatever is left.
    pub fn resolve(reported: Option<&CameraSettings>, desired: &CameraSettings) -> Self {
        let mode = |attribute: Attribute| {
            reported
                .and_then(|s| s.mode(attribute))
                .or_else(|| desired.mode(attribute))
                .unwrap_or_default()
        };
        let number = |attribute: Attribute| {
            reported
                .and_then(|s| s.numeric(attribute))
                .or_else(|| desired.numeric(attribute))
                .unwrap_or(0.0)
        };
        Self {
            exposure_mode: mode(Attribute::ExposureMode),
            exposure_time: number(Attribute::ExposureTime),
            focus_mode: mode(Attribute::FocusMode),
            focus_distance: number(Attribute::FocusDistance),
            white_balance_mode: mode(Attribute::WhiteBalanceMode),
            color_temperature: number(Attribute::ColorTemperature),
            brightness: number(Attribute::Brightness),
            contrast: number(Attribute::Contrast),
            exposure_compensation: number(Attribute::ExposureCompensation),
            width: number(Attribute::Width),
            height: number(Attribute::Height),
            frame_rate: number(Attribute::FrameRate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcaps::CapabilityRange;

    #[test]
    fn merge_overrides_only_present_keys() {
        let mut desired = CameraSettings::manual_modes().with(Attribute::Brightness, 10.0);
        let patch = CameraSettings::default()
            .with(Attribute::Contrast, 20.0)
            .with_mode(Attribute::FocusMode, ManualMode::Continuous);
        desired.merge(&patch);
        assert_eq!(desired.brightness, Some(10.0));
        assert_eq!(desired.contrast, Some(20.0));
        assert_eq!(desired.focus_mode, Some(ManualMode::Continuous));
        assert_eq!(desired.exposure_mode, Some(ManualMode::Manual));
    }

    #[test]
    fn clamp_touches_only_ranged_attributes() {
        let caps = Capabilities::builder()
            .range(Attribute::Brightness, CapabilityRange::bounded(-64.0, 64.0))
            .unwrap()
            .build();
        let mut desired = CameraSettings::default()
            .with(Attribute::Brightness, 9999.0)
            .with(Attribute::Contrast, 9999.0);
        desired.clamp_to(&caps);
        assert_eq!(desired.brightness, Some(64.0));
        assert_eq!(desired.contrast, Some(9999.0));
        assert_eq!(desired.focus_distance, None);
    }

    #[test]
    fn resolve_prefers_reported_then_desired() {
        let reported = CameraSettings::default()
            .with(Attribute::Width, 1280.0)
            .with_mode(Attribute::ExposureMode, ManualMode::Continuous);
        let desired = CameraSettings::manual_modes()
            .with(Attribute::Width, 640.0)
            .with(Attribute::Brightness, 12.0);
        let applied = AppliedCameraState::resolve(Some(&reported), &desired);
        assert_eq!(applied.width, 1280.0);
        assert_eq!(applied.brightness, 12.0);
        assert_eq!(applied.exposure_mode, ManualMode::Continuous);
        assert_eq!(applied.focus_mode, ManualMode::Manual);
        assert_eq!(applied.frame_rate, 0.0);

        let fallback = AppliedCameraState::resolve(None, &CameraSettings::default());
        assert_eq!(fallback.white_balance_mode, ManualMode::Manual);
        assert_eq!(fallback.contrast, 0.0);
    }

    #[test]
    fn settings_serialize_camel_case_and_skip_absent() {
        let settings = CameraSettings::default()
            .with(Attribute::FocusDistance, 250.0)
            .with_mode(Attribute::FocusMode, ManualMode::Manual);
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"focusMode":"manual","focusDistance":250.0}"#);
        let back: CameraSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
