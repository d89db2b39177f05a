//! Simulated camera backend.
//!
//! Stands in for real enumeration and capture in tests, demos and the CLI.
//! Each [`SimCamera`] declares its label, the resolutions it can deliver,
//! its capability snapshot and which attributes it refuses.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use camcaps::{Attribute, Capabilities, CapabilityRange, ManualMode};
use camdefs::Resolution;
use tracing::trace;

use crate::state::CameraSettings;
use crate::track::{
    Constraints, DeviceInfo, MediaDevices, SizeConstraint, StreamRequest, Track, TrackError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capabilities of a typical manually controllable webcam.
pub fn webcam_capabilities() -> Capabilities {
    let both = [ManualMode::Manual, ManualMode::Continuous];
    let build = || -> Result<Capabilities, camcaps::CapsError> {
        Ok(Capabilities::builder()
            .modes(Attribute::ExposureMode, both)?
            .modes(Attribute::FocusMode, both)?
            .modes(Attribute::WhiteBalanceMode, both)?
            .range(
                Attribute::ExposureTime,
                CapabilityRange::bounded(1.0, 10000.0).with_step(1.0),
            )?
            .range(
                Attribute::FocusDistance,
                CapabilityRange::bounded(0.0, 1023.0).with_step(1.0),
            )?
            .range(
                Attribute::ColorTemperature,
                CapabilityRange::bounded(2800.0, 6500.0).with_step(10.0),
            )?
            .range(
                Attribute::Brightness,
                CapabilityRange::bounded(-64.0, 64.0).with_step(1.0),
            )?
            .range(
                Attribute::Contrast,
                CapabilityRange::bounded(0.0, 100.0).with_step(1.0),
            )?
            .range(
                Attribute::ExposureCompensation,
                CapabilityRange::bounded(0.0, 128.0).with_step(1.0),
            )?
            .range(Attribute::Width, CapabilityRange::bounded(1.0, 2592.0))?
            .range(Attribute::Height, CapabilityRange::bounded(1.0, 1944.0))?
            .range(Attribute::FrameRate, CapabilityRange::bounded(1.0, 60.0))?
            .build())
    };
    build().unwrap_or_else(|_| Capabilities::unreported())
}

/// Description of one simulated device.
#[derive(Debug, Clone)]
pub struct SimCamera {
    pub device_id: String,
    pub label: String,
    pub resolutions: Vec<Resolution>,
    /// `None` makes capability reads fail.
    pub capabilities: Option<Capabilities>,
    /// Attributes whose presence in a request makes the whole apply fail.
    pub rejects: BTreeSet<Attribute>,
    /// Latency of every constraint apply.
    pub apply_delay: Duration,
}

impl SimCamera {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            resolutions: vec![Resolution::new(1280, 720), Resolution::new(640, 480)],
            capabilities: Some(webcam_capabilities()),
            rejects: BTreeSet::new(),
            apply_delay: Duration::ZERO,
        }
    }

    pub fn supporting(mut self, resolutions: impl IntoIterator<Item = Resolution>) -> Self {
        self.resolutions = resolutions.into_iter().collect();
        self
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.capabilities = Some(caps);
        self
    }

    pub fn without_capabilities(mut self) -> Self {
        self.capabilities = None;
        self
    }

    pub fn rejecting(mut self, attribute: Attribute) -> Self {
        self.rejects.insert(attribute);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::video(self.device_id.clone(), self.label.clone())
    }

    /// Resolution an acquisition request resolves to, if any.
    fn negotiate(&self, request: &StreamRequest) -> Option<Resolution> {
        match (request.width, request.height) {
            (Some(SizeConstraint::Exact(w)), Some(SizeConstraint::Exact(h))) => {
                let wanted = Resolution::new(w, h);
                self.resolutions.contains(&wanted).then_some(wanted)
            }
            (Some(w), Some(h)) => {
                let wanted = Resolution::new(w.value(), h.value());
                self.resolutions
                    .iter()
                    .copied()
                    .min_by_key(|r| r.pixels().abs_diff(wanted.pixels()))
            }
            _ => self.resolutions.first().copied(),
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    acquires: AtomicUsize,
    live: Arc<AtomicUsize>,
    last_request: Mutex<Option<StreamRequest>>,
    tracks: Mutex<Vec<Arc<SimTrack>>>,
}

/// Simulated enumeration and acquisition over a fixed device list.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevices {
    cameras: Vec<SimCamera>,
    extra: Vec<DeviceInfo>,
    stats: Arc<Stats>,
}

impl SimulatedDevices {
    pub fn new(cameras: Vec<SimCamera>) -> Self {
        Self {
            cameras,
            ..Self::default()
        }
    }

    /// Add a non-video device to the enumeration result.
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.extra.push(device);
        self
    }

    /// Number of acquisition attempts so far.
    pub fn acquire_count(&self) -> usize {
        self.stats.acquires.load(Ordering::SeqCst)
    }

    /// Tracks acquired and not yet stopped.
    pub fn live_tracks(&self) -> usize {
        self.stats.live.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        lock(&self.stats.last_request).clone()
    }

    /// Most recently acquired track.
    pub fn last_track(&self) -> Option<Arc<SimTrack>> {
        lock(&self.stats.tracks).last().cloned()
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, TrackError> {
        let mut devices: Vec<DeviceInfo> = self.cameras.iter().map(SimCamera::info).collect();
        devices.extend(self.extra.iter().cloned());
        Ok(devices)
    }

    async fn acquire(&self, request: &StreamRequest) -> Result<Arc<dyn Track>, TrackError> {
        self.stats.acquires.fetch_add(1, Ordering::SeqCst);
        *lock(&self.stats.last_request) = Some(request.clone());

        let camera = match request.device_id.as_deref() {
            Some(id) => self.cameras.iter().find(|c| c.device_id == id),
            None => self.cameras.first(),
        }
        .ok_or_else(|| TrackError::Acquire("no such device".into()))?;

        let resolution = camera
            .negotiate(request)
            .ok_or_else(|| TrackError::Acquire(format!("{} unavailable", describe(request))))?;

        let mut settings = CameraSettings::default()
            .with(Attribute::Width, resolution.width as f64)
            .with(Attribute::Height, resolution.height as f64)
            .with(Attribute::FrameRate, request.frame_rate.unwrap_or(30.0));
        if camera.capabilities.is_some() {
            settings = settings
                .with_mode(Attribute::ExposureMode, ManualMode::Continuous)
                .with_mode(Attribute::FocusMode, ManualMode::Continuous)
                .with_mode(Attribute::WhiteBalanceMode, ManualMode::Continuous);
        }

        let track = Arc::new(SimTrack {
            camera: camera.clone(),
            settings: Mutex::new(settings),
            log: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            live: Arc::clone(&self.stats.live),
        });
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        lock(&self.stats.tracks).push(Arc::clone(&track));
        trace!(device = %camera.device_id, %resolution, "simulated stream opened");
        Ok(track)
    }
}

fn describe(request: &StreamRequest) -> String {
    match (request.width, request.height) {
        (Some(w), Some(h)) => format!("{}x{}", w.value(), h.value()),
        _ => "stream".to_string(),
    }
}

/// Simulated hardware track.
#[derive(Debug)]
pub struct SimTrack {
    camera: SimCamera,
    settings: Mutex<CameraSettings>,
    log: Mutex<Vec<Constraints>>,
    stopped: AtomicBool,
    live: Arc<AtomicUsize>,
}

impl SimTrack {
    /// Every constraint set the track accepted or refused, in arrival order.
    pub fn applied_log(&self) -> Vec<Constraints> {
        lock(&self.log).clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn refused(&self, constraints: &Constraints) -> Option<Attribute> {
        Attribute::ALL.into_iter().find(|attribute| {
            self.camera.rejects.contains(attribute)
                && (constraints.advanced.mode(*attribute).is_some()
                    || constraints.advanced.numeric(*attribute).is_some())
        })
    }
}

#[async_trait]
impl Track for SimTrack {
    fn label(&self) -> &str {
        &self.camera.label
    }

    fn capabilities(&self) -> Result<Capabilities, TrackError> {
        self.camera
            .capabilities
            .clone()
            .ok_or_else(|| TrackError::Unavailable("capabilities not reported".into()))
    }

    fn settings(&self) -> Result<CameraSettings, TrackError> {
        if self.is_stopped() {
            return Err(TrackError::Ended);
        }
        Ok(lock(&self.settings).clone())
    }

    async fn apply_constraints(&self, constraints: &Constraints) -> Result<(), TrackError> {
        if self.is_stopped() {
            return Err(TrackError::Ended);
        }
        if !self.camera.apply_delay.is_zero() {
            tokio::time::sleep(self.camera.apply_delay).await;
        }
        lock(&self.log).push(constraints.clone());

        if let Some(attribute) = self.refused(constraints) {
            return Err(TrackError::Rejected(attribute.to_string()));
        }
        let resolution = match (constraints.width, constraints.height) {
            (Some(w), Some(h)) => {
                let request = StreamRequest {
                    width: Some(w),
                    height: Some(h),
                    ..StreamRequest::default()
                };
                let negotiated = self
                    .camera
                    .negotiate(&request)
                    .ok_or_else(|| TrackError::Rejected(describe(&request)))?;
                Some(negotiated)
            }
            _ => None,
        };

        let mut settings = lock(&self.settings);
        settings.merge(&constraints.advanced);
        if let Some(resolution) = resolution {
            settings.set_numeric(Attribute::Width, Some(resolution.width as f64));
            settings.set_numeric(Attribute::Height, Some(resolution.height as f64));
        }
        if let Some(fps) = constraints.frame_rate {
            settings.set_numeric(Attribute::FrameRate, Some(fps));
        }
        Ok(())
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{video_inputs, DeviceKind};

    #[tokio::test]
    async fn enumeration_filters_to_video_inputs() {
        let devices = SimulatedDevices::new(vec![SimCamera::new("a", "Logi C920")]).with_device(
            DeviceInfo {
                device_id: "mic".into(),
                label: "Mic".into(),
                kind: DeviceKind::AudioInput,
            },
        );
        assert_eq!(devices.enumerate().await.unwrap().len(), 2);
        let video = video_inputs(&devices).await.unwrap();
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].label, "Logi C920");
    }

    #[tokio::test]
    async fn rejected_attribute_fails_the_whole_request() {
        let devices = SimulatedDevices::new(vec![
            SimCamera::new("a", "Trust").rejecting(Attribute::ColorTemperature)
        ]);
        let track = devices.acquire(&StreamRequest::default()).await.unwrap();
        let constraints = Constraints::advanced(
            CameraSettings::default()
                .with(Attribute::ColorTemperature, 4000.0)
                .with(Attribute::Brightness, 10.0),
        );
        assert!(matches!(
            track.apply_constraints(&constraints).await,
            Err(TrackError::Rejected(_))
        ));
        assert_eq!(track.settings().unwrap().brightness, None);

        track.stop();
        track.stop();
        assert_eq!(devices.live_tracks(), 0);
        assert_eq!(track.settings(), Err(TrackError::Ended));
    }
}
