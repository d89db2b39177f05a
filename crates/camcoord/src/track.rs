//! Collaborator interfaces: hardware tracks, device enumeration and stream
//! acquisition.
//!
//! The coordinator never owns the capture lifecycle beyond holding the track
//! it was given; rendering, snapshots and recording consume tracks elsewhere.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use camcaps::Capabilities;
use camdefs::Resolution;
use thiserror::Error;

use crate::state::CameraSettings;

/// Failures reported by a track or by the device layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrackError {
    /// The device refused the constraint combination.
    #[error("constraint rejected: {0}")]
    Rejected(String),
    /// Capabilities or settings cannot be read from this track.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The track was stopped or the device went away.
    #[error("track ended")]
    Ended,
    /// Opening a capture stream failed (busy device, permission, driver).
    #[error("acquire failed: {0}")]
    Acquire(String),
    /// Enumerating devices failed.
    #[error("enumeration failed: {0}")]
    Enumerate(String),
}

/// Width/height request: hard requirement or preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeConstraint {
    Exact(u32),
    Ideal(u32),
}

impl SizeConstraint {
    pub fn value(self) -> u32 {
        match self {
            SizeConstraint::Exact(v) | SizeConstraint::Ideal(v) => v,
        }
    }

    pub fn is_exact(self) -> bool {
        matches!(self, SizeConstraint::Exact(_))
    }
}

/// One constraint-apply request against a track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    /// Attribute values to apply together.
    pub advanced: CameraSettings,
    pub width: Option<SizeConstraint>,
    pub height: Option<SizeConstraint>,
    /// Preferred frame rate.
    pub frame_rate: Option<f64>,
}

impl Constraints {
    /// Constraints carrying only attribute values.
    pub fn advanced(settings: CameraSettings) -> Self {
        Self {
            advanced: settings,
            ..Self::default()
        }
    }

    /// Constraints requesting an exact resolution.
    pub fn exact_resolution(resolution: Resolution) -> Self {
        Self {
            width: Some(SizeConstraint::Exact(resolution.width)),
            height: Some(SizeConstraint::Exact(resolution.height)),
            ..Self::default()
        }
    }
}

/// Live handle to one camera's video channel.
#[async_trait]
pub trait Track: Send + Sync + fmt::Debug {
    /// Label of the device the track belongs to.
    fn label(&self) -> &str;
    /// Hardware-reported ranges and modes.
    fn capabilities(&self) -> Result<Capabilities, TrackError>;
    /// Settings the hardware currently reports.
    fn settings(&self) -> Result<CameraSettings, TrackError>;
    /// Apply a constraint set. Implementations may reject the whole request.
    async fn apply_constraints(&self, constraints: &Constraints) -> Result<(), TrackError>;
    /// Release the underlying capture.
    fn stop(&self);
}

/// Kind of media device reported by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Enumerated media device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }
}

/// Stream acquisition request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamRequest {
    pub device_id: Option<String>,
    pub width: Option<SizeConstraint>,
    pub height: Option<SizeConstraint>,
    pub frame_rate: Option<f64>,
}

impl StreamRequest {
    /// Exclusive request for `resolution` at an ideal 30 fps.
    pub fn exact(device_id: Option<&str>, resolution: Resolution) -> Self {
        Self {
            device_id: device_id.map(str::to_string),
            width: Some(SizeConstraint::Exact(resolution.width)),
            height: Some(SizeConstraint::Exact(resolution.height)),
            frame_rate: Some(30.0),
        }
    }

    /// Same request with every size turned into a preference.
    pub fn relaxed(&self) -> Self {
        let soften = |c: Option<SizeConstraint>| c.map(|c| SizeConstraint::Ideal(c.value()));
        Self {
            device_id: self.device_id.clone(),
            width: soften(self.width),
            height: soften(self.height),
            frame_rate: self.frame_rate,
        }
    }
}

/// Device enumeration and stream acquisition.
#[async_trait]
pub trait MediaDevices: Send + Sync + fmt::Debug {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, TrackError>;
    async fn acquire(&self, request: &StreamRequest) -> Result<Arc<dyn Track>, TrackError>;
}

/// Enumerate and keep only video inputs.
pub async fn video_inputs(devices: &dyn MediaDevices) -> Result<Vec<DeviceInfo>, TrackError> {
    Ok(devices
        .enumerate()
        .await?
        .into_iter()
        .filter(|d| d.kind == DeviceKind::VideoInput)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxed_request_keeps_values() {
        let request = StreamRequest::exact(Some("cam0"), Resolution::new(2560, 1440));
        let relaxed = request.relaxed();
        assert_eq!(relaxed.width, Some(SizeConstraint::Ideal(2560)));
        assert_eq!(relaxed.height, Some(SizeConstraint::Ideal(1440)));
        assert_eq!(relaxed.device_id.as_deref(), Some("cam0"));
        assert_eq!(relaxed.frame_rate, Some(30.0));
        assert!(request.width.unwrap().is_exact());
    }
}
