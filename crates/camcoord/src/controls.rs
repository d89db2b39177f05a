//! Operator-facing manual camera controls.
//!
//! A [`CameraController`] drives one selected camera through a shared
//! [`CameraCoordinator`]. Manual operations only touch Trust cameras; every
//! other device is put back into its automatic modes once and then left alone.

use std::sync::Arc;

use camcaps::{Attribute, CapabilityRange, ManualMode};
use camdefs::{is_manual_capable, manual_default, manual_limit, pick_default, Resolution, StopIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coordinator::CameraCoordinator;
use crate::negotiate;
use crate::state::{AppliedCameraState, CameraSettings};
use crate::track::{video_inputs, Constraints, DeviceInfo, MediaDevices};
use crate::CoordinatorError;

/// Manual values a controller starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlSettings {
    pub focus_distance: f64,
    /// Requested shutter time in microseconds; snapped onto the stop ladder
    /// when applied.
    pub exposure_time: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub exposure_compensation: f64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        let value = |attribute| manual_default(attribute).unwrap_or_default();
        Self {
            focus_distance: value(Attribute::FocusDistance),
            exposure_time: value(Attribute::ExposureTime),
            brightness: value(Attribute::Brightness),
            contrast: value(Attribute::Contrast),
            exposure_compensation: value(Attribute::ExposureCompensation),
        }
    }
}

/// Bound `value` by the operator limits of `attribute`.
fn limit(attribute: Attribute, value: f64) -> f64 {
    manual_limit(attribute).map_or(value, |range| range.clamp_value(value))
}

/// Hardware range with missing bounds filled by `0..=100`.
fn init_bounds(range: Option<&CapabilityRange>) -> CapabilityRange {
    let range = range.copied().unwrap_or(CapabilityRange::UNBOUNDED);
    CapabilityRange::bounded(range.min.unwrap_or(0.0), range.max.unwrap_or(100.0))
}

type ControlResult = Result<Option<AppliedCameraState>, CoordinatorError>;

/// Manual controls for the selected camera.
#[derive(Debug)]
pub struct CameraController {
    coordinator: Arc<CameraCoordinator>,
    devices: Arc<dyn MediaDevices>,
    device: Option<DeviceInfo>,
    values: ControlSettings,
    stop: StopIndex,
    available: Vec<Resolution>,
    resolution: Option<Resolution>,
}

impl CameraController {
    pub fn new(
        coordinator: Arc<CameraCoordinator>,
        devices: Arc<dyn MediaDevices>,
        settings: ControlSettings,
    ) -> Self {
        let stop = StopIndex::nearest(settings.exposure_time);
        Self {
            coordinator,
            devices,
            device: None,
            values: settings,
            stop,
            available: Vec::new(),
            resolution: None,
        }
    }

    pub fn coordinator(&self) -> &Arc<CameraCoordinator> {
        &self.coordinator
    }

    /// Currently selected device.
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// Current manual values.
    pub fn values(&self) -> &ControlSettings {
        &self.values
    }

    pub fn exposure_stop(&self) -> StopIndex {
        self.stop
    }

    /// Resolutions confirmed by the last probe.
    pub fn available_resolutions(&self) -> &[Resolution] {
        &self.available
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Shutter fraction label of the current exposure stop.
    pub fn shutter_label(&self) -> String {
        self.stop.label()
    }

    /// Whether the selected camera takes manual constraints.
    pub fn is_manual_capable(&self) -> bool {
        match (&self.device, self.coordinator.track()) {
            (Some(device), _) => is_manual_capable(&device.label),
            (None, Some(track)) => is_manual_capable(track.label()),
            (None, None) => false,
        }
    }

    fn manual_target(&self) -> bool {
        self.coordinator.track().is_some() && self.is_manual_capable()
    }

    /// Video inputs the operator can choose from.
    pub async fn cameras(&self) -> Result<Vec<DeviceInfo>, CoordinatorError> {
        Ok(video_inputs(self.devices.as_ref()).await?)
    }

    /// Switch to `device`.
    ///
    /// Stops the previous track, probes the device's resolutions, opens a
    /// stream at the default pick and initialises the controls on it.
    /// Returns the resolution the stream was requested at.
    pub async fn select_camera(
        &mut self,
        device: &DeviceInfo,
    ) -> Result<Option<Resolution>, CoordinatorError> {
        if let Some(previous) = self.coordinator.clear_track() {
            previous.stop();
        }
        let device_id = Some(device.device_id.as_str());
        let supported = negotiate::probe(self.devices.as_ref(), device_id).await;
        let pick = pick_default(&supported);
        let track = negotiate::acquire(self.devices.as_ref(), device_id, pick).await?;

        if let Some(previous) = self.coordinator.set_track(track) {
            previous.stop();
        }
        self.device = Some(device.clone());
        self.available = supported;
        self.resolution = pick;
        info!(label = %device.label, resolution = ?pick, "camera selected");

        self.initialize().await;
        Ok(pick)
    }

    /// Bring a freshly attached track into its operating modes.
    ///
    /// Non-Trust devices get their automatic modes back. Trust devices get
    /// manual focus and exposure, the exposure stop, then brightness,
    /// contrast and compensation. Each attribute is its own best-effort
    /// request.
    pub async fn initialize(&mut self) {
        let Some(caps) = self.coordinator.capabilities() else {
            return;
        };
        if !self.is_manual_capable() {
            self.reset_to_auto(&caps).await;
            return;
        }

        if caps.supports_mode(Attribute::FocusMode, ManualMode::Manual) {
            self.best_effort(
                "focus mode",
                CameraSettings::default().with_mode(Attribute::FocusMode, ManualMode::Manual),
            )
            .await;
        }
        if caps.supports_mode(Attribute::ExposureMode, ManualMode::Manual) {
            self.best_effort(
                "exposure mode",
                CameraSettings::default().with_mode(Attribute::ExposureMode, ManualMode::Manual),
            )
            .await;
        }
        if caps.supports(Attribute::ExposureTime) {
            self.stop = StopIndex::nearest(self.values.exposure_time);
            self.values.exposure_time = self.stop.value_us() as f64;
            self.best_effort(
                "exposure time",
                CameraSettings::default().with(Attribute::ExposureTime, self.values.exposure_time),
            )
            .await;
        }

        for (attribute, value) in [
            (Attribute::Brightness, self.values.brightness),
            (Attribute::Contrast, self.values.contrast),
            (Attribute::ExposureCompensation, self.values.exposure_compensation),
        ] {
            if caps.supports(attribute) {
                let clamped = init_bounds(caps.range(attribute)).clamp_value(value);
                debug!(%attribute, value, clamped, "initial manual value");
                let patch = CameraSettings::default().with(attribute, clamped);
                self.best_effort(attribute.name(), patch).await;
            }
        }
    }

    /// Put every supported mode back to continuous, all at once first and
    /// then one mode at a time.
    async fn reset_to_auto(&self, caps: &camcaps::Capabilities) {
        let modes: Vec<Attribute> = [Attribute::FocusMode, Attribute::ExposureMode]
            .into_iter()
            .filter(|attribute| caps.supports_mode(*attribute, ManualMode::Continuous))
            .collect();
        if modes.is_empty() {
            return;
        }
        let combined = modes.iter().fold(CameraSettings::default(), |settings, attribute| {
            settings.with_mode(*attribute, ManualMode::Continuous)
        });
        match self
            .coordinator
            .apply_constraints(&Constraints::advanced(combined))
            .await
        {
            Ok(()) => return,
            Err(err) => debug!(error = %err, "combined auto reset refused"),
        }
        for attribute in modes {
            let single = CameraSettings::default().with_mode(attribute, ManualMode::Continuous);
            if let Err(err) = self
                .coordinator
                .apply_constraints(&Constraints::advanced(single))
                .await
            {
                warn!(%attribute, error = %err, "continuous mode not supported");
            }
        }
    }

    /// Re-send every manual setting after the device may have dropped them,
    /// one attribute per request so a refused one cannot block the rest.
    pub async fn reassert_manual(&self) {
        if !self.manual_target() {
            debug!("skipping manual reassertion");
            return;
        }
        let steps = [
            (
                "focus mode",
                CameraSettings::default().with_mode(Attribute::FocusMode, ManualMode::Manual),
            ),
            (
                "exposure mode",
                CameraSettings::default().with_mode(Attribute::ExposureMode, ManualMode::Manual),
            ),
            (
                "focus distance",
                CameraSettings::default().with(Attribute::FocusDistance, self.values.focus_distance),
            ),
            (
                "exposure time",
                CameraSettings::default().with(Attribute::ExposureTime, self.values.exposure_time),
            ),
            (
                "brightness",
                CameraSettings::default().with(Attribute::Brightness, self.values.brightness),
            ),
            (
                "contrast",
                CameraSettings::default().with(Attribute::Contrast, self.values.contrast),
            ),
            (
                "exposure compensation",
                CameraSettings::default().with(
                    Attribute::ExposureCompensation,
                    self.values.exposure_compensation,
                ),
            ),
        ];
        for (what, patch) in steps {
            self.best_effort(what, patch).await;
        }
    }

    async fn best_effort(&self, what: &str, patch: CameraSettings) {
        if let Err(err) = self.coordinator.apply_settings(&patch).await {
            warn!(step = what, error = %err, "camera setting not applied");
        }
    }

    pub async fn set_focus_distance(&mut self, distance: f64) -> ControlResult {
        if !self.manual_target() {
            return Ok(None);
        }
        self.values.focus_distance = limit(Attribute::FocusDistance, distance);
        let patch = CameraSettings::default()
            .with_mode(Attribute::FocusMode, ManualMode::Manual)
            .with(Attribute::FocusDistance, self.values.focus_distance);
        self.coordinator.apply_settings(&patch).await.map(Some)
    }

    pub async fn adjust_focus_by(&mut self, delta: f64) -> ControlResult {
        self.set_focus_distance(self.values.focus_distance + delta)
            .await
    }

    /// Set the shutter time, snapped to the nearest exposure stop.
    pub async fn set_exposure_time(&mut self, microseconds: f64) -> ControlResult {
        if !self.manual_target() {
            return Ok(None);
        }
        let stop = StopIndex::nearest(limit(Attribute::ExposureTime, microseconds));
        self.apply_stop(stop).await
    }

    /// Move `delta` stops along the ladder. Nothing is sent when the index
    /// would not change.
    pub async fn step_exposure(&mut self, delta: i32) -> ControlResult {
        if !self.manual_target() {
            return Ok(None);
        }
        match self.stop.step(delta) {
            Some(stop) => self.apply_stop(stop).await,
            None => Ok(None),
        }
    }

    async fn apply_stop(&mut self, stop: StopIndex) -> ControlResult {
        self.stop = stop;
        self.values.exposure_time = stop.value_us() as f64;
        let patch = CameraSettings::default()
            .with_mode(Attribute::ExposureMode, ManualMode::Manual)
            .with(Attribute::ExposureTime, self.values.exposure_time);
        self.coordinator.apply_settings(&patch).await.map(Some)
    }

    pub async fn set_brightness(&mut self, value: f64) -> ControlResult {
        if !self.manual_target() {
            return Ok(None);
        }
        self.values.brightness = limit(Attribute::Brightness, value);
        self.apply_numeric(Attribute::Brightness, self.values.brightness)
            .await
    }

    pub async fn adjust_brightness_by(&mut self, delta: f64) -> ControlResult {
        self.set_brightness(self.values.brightness + delta).await
    }

    pub async fn set_contrast(&mut self, value: f64) -> ControlResult {
        if !self.manual_target() {
            return Ok(None);
        }
        self.values.contrast = limit(Attribute::Contrast, value);
        self.apply_numeric(Attribute::Contrast, self.values.contrast)
            .await
    }

    pub async fn adjust_contrast_by(&mut self, delta: f64) -> ControlResult {
        self.set_contrast(self.values.contrast + delta).await
    }

    pub async fn set_exposure_compensation(&mut self, value: f64) -> ControlResult {
        if !self.manual_target() {
            return Ok(None);
        }
        self.values.exposure_compensation = limit(Attribute::ExposureCompensation, value);
        self.apply_numeric(
            Attribute::ExposureCompensation,
            self.values.exposure_compensation,
        )
        .await
    }

    pub async fn adjust_exposure_compensation_by(&mut self, delta: f64) -> ControlResult {
        self.set_exposure_compensation(self.values.exposure_compensation + delta)
            .await
    }

    async fn apply_numeric(&self, attribute: Attribute, value: f64) -> ControlResult {
        let patch = CameraSettings::default().with(attribute, value);
        self.coordinator.apply_settings(&patch).await.map(Some)
    }

    /// Renegotiate to one of the candidate resolutions, given as `WxH`.
    ///
    /// On success the manual state is re-asserted, since a renegotiation can
    /// put the device back into automatic modes.
    pub async fn apply_resolution(&mut self, text: &str) -> ControlResult {
        if !self.manual_target() {
            return Ok(None);
        }
        let resolution = Resolution::candidate(text)
            .ok_or_else(|| CoordinatorError::InvalidResolution(text.to_string()))?;
        let applied = self.coordinator.apply_resolution(resolution).await?;
        self.resolution = Some(resolution);
        self.reassert_manual().await;
        Ok(Some(self.coordinator.applied().unwrap_or(applied)))
    }
}
