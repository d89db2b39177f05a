//! Camera capabilities: hardware-reported parameter ranges and the clamper
//! that maps requested values onto them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

/// Error type produced while building or parsing capability data.
#[derive(Debug, Error, PartialEq)]
pub enum CapsError {
    /// The attribute name is not one of the controllable attributes.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),
    /// A mode string was neither `manual` nor `continuous`.
    #[error("unknown mode: {0}")]
    UnknownMode(String),
    /// A range bound or step is NaN or infinite.
    #[error("non-finite bound for {0}")]
    NonFinite(Attribute),
    /// The declared minimum exceeds the declared maximum.
    #[error("inverted range for {attribute}: min {min} > max {max}")]
    InvertedRange {
        attribute: Attribute,
        min: f64,
        max: f64,
    },
    /// A range was attached to a mode attribute or vice versa.
    #[error("attribute {0} does not take this kind of capability")]
    Kind(Attribute),
}

/// Controllable camera attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Attribute {
    ExposureMode,
    ExposureTime,
    FocusMode,
    FocusDistance,
    WhiteBalanceMode,
    ColorTemperature,
    Brightness,
    Contrast,
    ExposureCompensation,
    Width,
    Height,
    FrameRate,
}

impl Attribute {
    /// Every attribute, in display order.
    pub const ALL: [Attribute; 12] = [
        Attribute::ExposureMode,
        Attribute::ExposureTime,
        Attribute::FocusMode,
        Attribute::FocusDistance,
        Attribute::WhiteBalanceMode,
        Attribute::ColorTemperature,
        Attribute::Brightness,
        Attribute::Contrast,
        Attribute::ExposureCompensation,
        Attribute::Width,
        Attribute::Height,
        Attribute::FrameRate,
    ];

    /// The three binary mode attributes.
    pub const MODES: [Attribute; 3] = [
        Attribute::ExposureMode,
        Attribute::FocusMode,
        Attribute::WhiteBalanceMode,
    ];

    /// Wire name of the attribute (`focusDistance`, `exposureMode`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Attribute::ExposureMode => "exposureMode",
            Attribute::ExposureTime => "exposureTime",
            Attribute::FocusMode => "focusMode",
            Attribute::FocusDistance => "focusDistance",
            Attribute::WhiteBalanceMode => "whiteBalanceMode",
            Attribute::ColorTemperature => "colorTemperature",
            Attribute::Brightness => "brightness",
            Attribute::Contrast => "contrast",
            Attribute::ExposureCompensation => "exposureCompensation",
            Attribute::Width => "width",
            Attribute::Height => "height",
            Attribute::FrameRate => "frameRate",
        }
    }

    /// Whether the attribute is a `manual | continuous` mode flag.
    pub fn is_mode(self) -> bool {
        Self::MODES.contains(&self)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = CapsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .iter()
            .copied()
            .find(|attr| attr.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CapsError::UnknownAttribute(s.to_string()))
    }
}

/// Binary mode tag for exposure, focus and white balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ManualMode {
    #[default]
    Manual,
    Continuous,
}

impl fmt::Display for ManualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualMode::Manual => f.write_str("manual"),
            ManualMode::Continuous => f.write_str("continuous"),
        }
    }
}

impl FromStr for ManualMode {
    type Err = CapsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(ManualMode::Manual),
            // Browsers and UVC stacks also call this "auto".
            "continuous" | "auto" => Ok(ManualMode::Continuous),
            other => Err(CapsError::UnknownMode(other.to_string())),
        }
    }
}

/// Hardware-reported legal range for one numeric attribute.
///
/// Absent fields mean the hardware does not constrain that side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CapabilityRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl CapabilityRange {
    /// Range with no bounds at all.
    pub const UNBOUNDED: CapabilityRange = CapabilityRange {
        min: None,
        max: None,
        step: None,
    };

    /// Range bounded on both sides without a step.
    pub fn bounded(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            step: None,
        }
    }

    /// Attach a step to the range.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Bound `value` into the range, then snap it onto the step grid.
    ///
    /// The grid starts at `min` (or 0 when `min` is absent). A non-positive
    /// step is ignored. Snapping never leaves `[min, max]`.
    pub fn clamp_value(&self, value: f64) -> f64 {
        let mut x = value;
        if let Some(min) = self.min {
            x = x.max(min);
        }
        if let Some(max) = self.max {
            x = x.min(max);
        }
        let Some(step) = self.step.filter(|s| *s > 0.0 && s.is_finite()) else {
            return x;
        };
        let base = self.min.unwrap_or(0.0);
        let mut snapped = base + ((x - base) / step).round() * step;
        if let Some(max) = self.max {
            if snapped > max {
                snapped = base + ((max - base) / step).floor() * step;
            }
        }
        if let Some(min) = self.min {
            if snapped < min {
                snapped = min;
            }
        }
        snapped
    }

    /// Whether `value` already lies inside the bounds (step is not checked).
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    fn validate(&self, attribute: Attribute) -> Result<(), CapsError> {
        for bound in [self.min, self.max, self.step].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(CapsError::NonFinite(attribute));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(CapsError::InvertedRange {
                    attribute,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Clamp an optional request against a range.
///
/// `None` stays `None`: the absence of a request is not a request for a default.
pub fn clamp(value: Option<f64>, range: &CapabilityRange) -> Option<f64> {
    value.map(|v| range.clamp_value(v))
}

/// Read-only snapshot of everything a track reported about its attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Capabilities {
    ranges: HashMap<Attribute, CapabilityRange>,
    modes: HashMap<Attribute, Vec<ManualMode>>,
    reported: bool,
}

impl Capabilities {
    /// Snapshot for a track that could not report capabilities.
    ///
    /// Every attribute counts as supported and no value is clamped.
    pub fn unreported() -> Self {
        Self::default()
    }

    /// Start building a reported snapshot.
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::default()
    }

    /// Whether the snapshot came from the hardware.
    pub fn is_reported(&self) -> bool {
        self.reported
    }

    /// Range reported for a numeric attribute.
    pub fn range(&self, attribute: Attribute) -> Option<&CapabilityRange> {
        self.ranges.get(&attribute)
    }

    /// Modes reported for a mode attribute.
    pub fn modes(&self, attribute: Attribute) -> Option<&[ManualMode]> {
        self.modes.get(&attribute).map(Vec::as_slice)
    }

    /// Whether the hardware declares the attribute at all.
    pub fn supports(&self, attribute: Attribute) -> bool {
        if !self.reported {
            return true;
        }
        if attribute.is_mode() {
            self.modes.contains_key(&attribute)
        } else {
            self.ranges.contains_key(&attribute)
        }
    }

    /// Whether a mode attribute accepts the given mode.
    pub fn supports_mode(&self, attribute: Attribute, mode: ManualMode) -> bool {
        if !self.reported {
            return true;
        }
        self.modes(attribute)
            .map_or(false, |modes| modes.contains(&mode))
    }

    /// Clamp a requested value for `attribute` against its range, if any.
    pub fn clamp(&self, attribute: Attribute, value: Option<f64>) -> Option<f64> {
        match self.ranges.get(&attribute) {
            Some(range) => {
                let clamped = clamp(value, range);
                if clamped != value {
                    debug!(%attribute, ?value, ?clamped, "clamped to hardware range");
                }
                clamped
            }
            None => value,
        }
    }
}

/// Builder for [`Capabilities`]; validates every range it receives.
#[derive(Debug, Default)]
pub struct CapabilitiesBuilder {
    ranges: HashMap<Attribute, CapabilityRange>,
    modes: HashMap<Attribute, Vec<ManualMode>>,
}

impl CapabilitiesBuilder {
    /// Declare the range of a numeric attribute.
    pub fn range(mut self, attribute: Attribute, range: CapabilityRange) -> Result<Self, CapsError> {
        if attribute.is_mode() {
            return Err(CapsError::Kind(attribute));
        }
        range.validate(attribute)?;
        self.ranges.insert(attribute, range);
        Ok(self)
    }

    /// Declare the modes a mode attribute accepts.
    pub fn modes<I>(mut self, attribute: Attribute, modes: I) -> Result<Self, CapsError>
    where
        I: IntoIterator<Item = ManualMode>,
    {
        if !attribute.is_mode() {
            return Err(CapsError::Kind(attribute));
        }
        let mut list: Vec<ManualMode> = Vec::new();
        for mode in modes {
            if !list.contains(&mode) {
                list.push(mode);
            }
        }
        self.modes.insert(attribute, list);
        Ok(self)
    }

    pub fn build(self) -> Capabilities {
        Capabilities {
            ranges: self.ranges,
            modes: self.modes,
            reported: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_grid(value: f64, base: f64, step: f64) -> bool {
        let k = (value - base) / step;
        (k - k.round()).abs() < 1e-9
    }

    #[test]
    fn clamp_bounds_both_sides() {
        let range = CapabilityRange::bounded(-64.0, 64.0);
        assert_eq!(range.clamp_value(9999.0), 64.0);
        assert_eq!(range.clamp_value(-9999.0), -64.0);
        assert_eq!(range.clamp_value(12.5), 12.5);
    }

    #[test]
    fn clamp_snaps_from_min() {
        let range = CapabilityRange::bounded(1.0, 100.0).with_step(4.0);
        // grid is 1, 5, 9, ...; 10 is closer to 9 than to 13
        assert_eq!(range.clamp_value(10.0), 9.0);
        assert_eq!(range.clamp_value(12.0), 13.0);
    }

    #[test]
    fn clamp_snaps_from_zero_without_min() {
        let range = CapabilityRange {
            min: None,
            max: Some(100.0),
            step: Some(10.0),
        };
        assert_eq!(range.clamp_value(34.0), 30.0);
        assert_eq!(range.clamp_value(-16.0), -20.0);
    }

    #[test]
    fn snapping_never_exceeds_max() {
        let range = CapabilityRange::bounded(0.0, 10.0).with_step(4.0);
        // 10 would round up to 12; must land on 8 instead
        assert_eq!(range.clamp_value(10.0), 8.0);
    }

    #[test]
    fn clamp_ignores_non_positive_step() {
        let range = CapabilityRange::bounded(0.0, 10.0).with_step(0.0);
        assert_eq!(range.clamp_value(3.3), 3.3);
        let range = CapabilityRange::bounded(0.0, 10.0).with_step(-2.0);
        assert_eq!(range.clamp_value(3.3), 3.3);
    }

    #[test]
    fn clamp_is_noop_for_absent_value() {
        let range = CapabilityRange::bounded(0.0, 1.0);
        assert_eq!(clamp(None, &range), None);
        assert_eq!(clamp(Some(2.0), &range), Some(1.0));
    }

    #[test]
    fn unbounded_range_passes_values_through() {
        assert_eq!(CapabilityRange::UNBOUNDED.clamp_value(-1e9), -1e9);
    }

    #[test]
    fn clamp_lands_inside_range_and_on_grid() {
        let ranges = [
            CapabilityRange::bounded(-64.0, 64.0).with_step(1.0),
            CapabilityRange::bounded(0.0, 1023.0).with_step(5.0),
            CapabilityRange::bounded(3.0, 5050.0).with_step(7.0),
            CapabilityRange::bounded(0.5, 2.0).with_step(0.25),
        ];
        let mut value = -20_000.0;
        while value < 20_000.0 {
            for range in &ranges {
                let out = range.clamp_value(value);
                let (min, max, step) = (range.min.unwrap(), range.max.unwrap(), range.step.unwrap());
                assert!(out >= min && out <= max, "{value} -> {out} outside {range:?}");
                assert!(on_grid(out, min, step), "{value} -> {out} off grid {range:?}");
            }
            value += 13.37;
        }
    }

    #[test]
    fn builder_rejects_bad_ranges() {
        let err = Capabilities::builder()
            .range(Attribute::Brightness, CapabilityRange::bounded(5.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, CapsError::InvertedRange { .. }));

        let err = Capabilities::builder()
            .range(Attribute::Contrast, CapabilityRange::bounded(0.0, f64::NAN))
            .unwrap_err();
        assert_eq!(err, CapsError::NonFinite(Attribute::Contrast));

        let err = Capabilities::builder()
            .range(Attribute::FocusMode, CapabilityRange::UNBOUNDED)
            .unwrap_err();
        assert_eq!(err, CapsError::Kind(Attribute::FocusMode));
    }

    #[test]
    fn supports_follows_reported_snapshot() {
        let caps = Capabilities::builder()
            .range(Attribute::Brightness, CapabilityRange::bounded(-64.0, 64.0))
            .unwrap()
            .modes(
                Attribute::FocusMode,
                [ManualMode::Continuous, ManualMode::Continuous],
            )
            .unwrap()
            .build();
        assert!(caps.supports(Attribute::Brightness));
        assert!(!caps.supports(Attribute::Contrast));
        assert!(caps.supports(Attribute::FocusMode));
        assert_eq!(caps.modes(Attribute::FocusMode), Some(&[ManualMode::Continuous][..]));
        assert!(!caps.supports_mode(Attribute::FocusMode, ManualMode::Manual));
        assert_eq!(caps.clamp(Attribute::Brightness, Some(100.0)), Some(64.0));
        assert_eq!(caps.clamp(Attribute::Contrast, Some(100.0)), Some(100.0));

        let unknown = Capabilities::unreported();
        assert!(unknown.supports(Attribute::Contrast));
        assert!(unknown.supports_mode(Attribute::ExposureMode, ManualMode::Manual));
    }

    #[test]
    fn attribute_and_mode_parsing() {
        assert_eq!("focusDistance".parse::<Attribute>(), Ok(Attribute::FocusDistance));
        assert_eq!("FRAMERATE".parse::<Attribute>(), Ok(Attribute::FrameRate));
        assert!("zoom".parse::<Attribute>().is_err());
        assert_eq!("auto".parse::<ManualMode>(), Ok(ManualMode::Continuous));
        assert_eq!(ManualMode::Manual.to_string(), "manual");
        assert!(Attribute::WhiteBalanceMode.is_mode());
        assert!(!Attribute::Width.is_mode());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn range_serializes_with_optional_fields() {
        let range = CapabilityRange::bounded(0.0, 10.0);
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, r#"{"min":0.0,"max":10.0,"step":null}"#);
    }
}
