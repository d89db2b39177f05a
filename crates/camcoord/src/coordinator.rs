//! Camera state coordinator.
//!
//! Owns the desired state and the active track for one camera. Every hardware
//! apply goes through a FIFO gate bound to the track, so two overlapping
//! patches reach the device strictly in submission order and never overlap.
//! Desired-state changes are published before the applied state they lead to.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camcaps::{Attribute, Capabilities, ManualMode};
use camdefs::Resolution;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::{AppliedCameraState, CameraSettings, DesiredCameraState};
use crate::track::{Constraints, SizeConstraint, Track, TrackError};
use crate::CoordinatorError;

/// Result of one turn on the track.
struct TurnOutcome {
    result: Result<(), TrackError>,
    reported: Option<CameraSettings>,
}

/// Single-flight gate around one track.
///
/// `tokio::sync::Mutex` queues waiters in FIFO order, which is what makes
/// overlapping applies land in submission order.
#[derive(Debug)]
struct TrackQueue {
    track: Arc<dyn Track>,
    gate: tokio::sync::Mutex<()>,
}

impl TrackQueue {
    async fn turn(&self, constraints: &Constraints) -> TurnOutcome {
        let _turn = self.gate.lock().await;
        let result = self.track.apply_constraints(constraints).await;
        if let Err(err) = &result {
            warn!(label = self.track.label(), error = %err, "track rejected constraints");
        }
        let reported = match self.track.settings() {
            Ok(settings) => Some(settings),
            Err(err) => {
                debug!(error = %err, "track settings unavailable");
                None
            }
        };
        TurnOutcome { result, reported }
    }
}

#[derive(Debug)]
struct ActiveTrack {
    queue: Arc<TrackQueue>,
    caps: Arc<Capabilities>,
    generation: u64,
}

#[derive(Debug)]
struct Inner {
    desired: DesiredCameraState,
    active: Option<ActiveTrack>,
    generation: u64,
}

/// Coordinates desired/applied camera state over a single hardware track.
#[derive(Debug)]
pub struct CameraCoordinator {
    inner: Mutex<Inner>,
    desired_tx: watch::Sender<DesiredCameraState>,
    applied_tx: watch::Sender<Option<AppliedCameraState>>,
}

impl Default for CameraCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraCoordinator {
    /// Coordinator with no track and every mode requested manual.
    pub fn new() -> Self {
        let desired = CameraSettings::manual_modes();
        let (desired_tx, _) = watch::channel(desired.clone());
        let (applied_tx, _) = watch::channel(None);
        Self {
            inner: Mutex::new(Inner {
                desired,
                active: None,
                generation: 0,
            }),
            desired_tx,
            applied_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the active track and re-read its capabilities.
    ///
    /// Previously desired state is not re-applied. Applies still queued on
    /// the old track keep running, but their results are no longer published.
    /// Returns the replaced track so the caller can stop it.
    pub fn set_track(&self, track: Arc<dyn Track>) -> Option<Arc<dyn Track>> {
        let caps = match track.capabilities() {
            Ok(caps) => caps,
            Err(err) => {
                warn!(label = track.label(), error = %err, "capabilities unavailable; nothing will be clamped");
                Capabilities::unreported()
            }
        };
        info!(label = track.label(), reported = caps.is_reported(), "camera track attached");
        let mut inner = self.lock();
        inner.generation += 1;
        let generation = inner.generation;
        let previous = inner.active.replace(ActiveTrack {
            queue: Arc::new(TrackQueue {
                track,
                gate: tokio::sync::Mutex::new(()),
            }),
            caps: Arc::new(caps),
            generation,
        });
        previous.map(|active| Arc::clone(&active.queue.track))
    }

    /// Detach the active track, returning it.
    pub fn clear_track(&self) -> Option<Arc<dyn Track>> {
        let mut inner = self.lock();
        inner.generation += 1;
        inner
            .active
            .take()
            .map(|active| Arc::clone(&active.queue.track))
    }

    /// Currently attached track.
    pub fn track(&self) -> Option<Arc<dyn Track>> {
        self.lock()
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.queue.track))
    }

    /// Capability snapshot of the active track.
    pub fn capabilities(&self) -> Option<Arc<Capabilities>> {
        self.lock()
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.caps))
    }

    /// Snapshot of the desired state.
    pub fn desired(&self) -> DesiredCameraState {
        self.lock().desired.clone()
    }

    /// Last published applied state.
    pub fn applied(&self) -> Option<AppliedCameraState> {
        self.applied_tx.borrow().clone()
    }

    /// Observe desired-state changes.
    pub fn subscribe_desired(&self) -> watch::Receiver<DesiredCameraState> {
        self.desired_tx.subscribe()
    }

    /// Observe applied-state changes.
    pub fn subscribe_applied(&self) -> watch::Receiver<Option<AppliedCameraState>> {
        self.applied_tx.subscribe()
    }

    /// Merge `patch` into the desired state and apply it to the hardware.
    ///
    /// The merged state is clamped and published immediately; the apply then
    /// waits behind every earlier apply on the same track. A hardware
    /// rejection is returned to this caller only. The desired state is kept
    /// either way and the applied state is published either way.
    pub async fn apply_patch(
        &self,
        patch: &CameraSettings,
    ) -> Result<AppliedCameraState, CoordinatorError> {
        let (queue, constraints, generation) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.desired.merge(patch);
            if let Some(active) = inner.active.as_ref() {
                inner.desired.clamp_to(&active.caps);
            }
            self.desired_tx.send_replace(inner.desired.clone());

            let Some(active) = inner.active.as_ref() else {
                let applied = AppliedCameraState::resolve(None, &inner.desired);
                self.applied_tx.send_replace(Some(applied.clone()));
                return Ok(applied);
            };
            (
                Arc::clone(&active.queue),
                build_constraints(&inner.desired, &active.caps),
                active.generation,
            )
        };

        let outcome = queue.turn(&constraints).await;
        let applied = self.publish_applied(outcome.reported.as_ref(), generation);
        match outcome.result {
            Ok(()) => Ok(applied),
            Err(source) => Err(CoordinatorError::Rejected {
                source,
                applied: Box::new(applied),
            }),
        }
    }

    /// Apply only the attributes in `patch`, leaving the rest of the desired
    /// state off the wire.
    ///
    /// The patch enters the desired state once the hardware accepts it, so an
    /// attribute the device refuses is never carried into later applies.
    pub async fn apply_settings(
        &self,
        patch: &CameraSettings,
    ) -> Result<AppliedCameraState, CoordinatorError> {
        let (queue, caps, generation) = {
            let inner = self.lock();
            let active = inner.active.as_ref().ok_or(CoordinatorError::NoTrack)?;
            (
                Arc::clone(&active.queue),
                Arc::clone(&active.caps),
                active.generation,
            )
        };
        let mut patch = patch.clone();
        patch.clamp_to(&caps);
        let constraints = build_constraints(&patch, &caps);

        let outcome = queue.turn(&constraints).await;
        if let Err(source) = outcome.result {
            let applied = self.publish_applied(outcome.reported.as_ref(), generation);
            return Err(CoordinatorError::Rejected {
                source,
                applied: Box::new(applied),
            });
        }
        {
            let mut inner = self.lock();
            inner.desired.merge(&patch);
            self.desired_tx.send_replace(inner.desired.clone());
        }
        Ok(self.publish_applied(outcome.reported.as_ref(), generation))
    }

    /// Apply raw constraints through the track queue without touching the
    /// desired state.
    pub async fn apply_constraints(&self, constraints: &Constraints) -> Result<(), CoordinatorError> {
        let queue = self.active_queue()?;
        queue.turn(constraints).await.result.map_err(Into::into)
    }

    /// Renegotiate the capture resolution.
    ///
    /// The desired width/height change only when the hardware accepts it.
    pub async fn apply_resolution(
        &self,
        resolution: Resolution,
    ) -> Result<AppliedCameraState, CoordinatorError> {
        let (queue, generation) = {
            let inner = self.lock();
            let active = inner.active.as_ref().ok_or(CoordinatorError::NoTrack)?;
            (Arc::clone(&active.queue), active.generation)
        };
        let constraints = Constraints::exact_resolution(resolution);
        let outcome = queue.turn(&constraints).await;
        if let Err(err) = outcome.result {
            warn!(%resolution, error = %err, "resolution change rejected");
            return Err(CoordinatorError::ResolutionUnsupported(resolution.to_string()));
        }
        {
            let mut inner = self.lock();
            let patch = CameraSettings::default()
                .with(Attribute::Width, resolution.width as f64)
                .with(Attribute::Height, resolution.height as f64);
            inner.desired.merge(&patch);
            self.desired_tx.send_replace(inner.desired.clone());
        }
        info!(%resolution, "resolution applied");
        Ok(self.publish_applied(outcome.reported.as_ref(), generation))
    }

    fn active_queue(&self) -> Result<Arc<TrackQueue>, CoordinatorError> {
        self.lock()
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.queue))
            .ok_or(CoordinatorError::NoTrack)
    }

    fn publish_applied(
        &self,
        reported: Option<&CameraSettings>,
        generation: u64,
    ) -> AppliedCameraState {
        let inner = self.lock();
        let applied = AppliedCameraState::resolve(reported, &inner.desired);
        if inner.generation == generation {
            self.applied_tx.send_replace(Some(applied.clone()));
        } else {
            debug!(generation, "dropping applied state of a replaced track");
        }
        applied
    }
}

/// Translate the desired state into one constraint request.
///
/// Attributes the track does not declare are left out; width and height are
/// only sent as a pair.
fn build_constraints(desired: &DesiredCameraState, caps: &Capabilities) -> Constraints {
    let mut advanced = CameraSettings::default();
    for attribute in Attribute::ALL {
        if matches!(
            attribute,
            Attribute::Width | Attribute::Height | Attribute::FrameRate
        ) {
            continue;
        }
        if attribute.is_mode() {
            let mode: Option<ManualMode> = desired
                .mode(attribute)
                .filter(|mode| caps.supports_mode(attribute, *mode));
            advanced.set_mode(attribute, mode);
        } else if caps.supports(attribute) {
            advanced.set_numeric(attribute, desired.numeric(attribute));
        }
    }

    let mut constraints = Constraints::advanced(advanced);
    if let (Some(width), Some(height)) = (desired.width, desired.height) {
        if width > 0.0 && height > 0.0 {
            constraints.width = Some(SizeConstraint::Exact(width.round() as u32));
            constraints.height = Some(SizeConstraint::Exact(height.round() as u32));
            constraints.frame_rate = desired.frame_rate.filter(|fps| *fps > 0.0);
        }
    }
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use camcaps::CapabilityRange;

    #[derive(Debug, Default)]
    struct MockTrack {
        caps: Option<Capabilities>,
        reported: Mutex<CameraSettings>,
        log: Mutex<Vec<Constraints>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        reject_contrast_above: Option<f64>,
    }

    impl MockTrack {
        fn with_caps(caps: Capabilities) -> Self {
            Self {
                caps: Some(caps),
                ..Self::default()
            }
        }

        fn log(&self) -> Vec<Constraints> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Track for MockTrack {
        fn label(&self) -> &str {
            "Mock Trust Cam"
        }

        fn capabilities(&self) -> Result<Capabilities, TrackError> {
            self.caps
                .clone()
                .ok_or_else(|| TrackError::Unavailable("no caps".into()))
        }

        fn settings(&self) -> Result<CameraSettings, TrackError> {
            Ok(self.reported.lock().unwrap().clone())
        }

        async fn apply_constraints(&self, constraints: &Constraints) -> Result<(), TrackError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            // later calls finish faster, so any overlap would reorder the log
            let delay = 30u64.saturating_sub(10 * self.log.lock().unwrap().len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.log.lock().unwrap().push(constraints.clone());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let (Some(limit), Some(contrast)) =
                (self.reject_contrast_above, constraints.advanced.contrast)
            {
                if contrast > limit {
                    return Err(TrackError::Rejected(format!("contrast {contrast}")));
                }
            }
            if let Some(w) = constraints.width {
                if w.value() == 9999 {
                    return Err(TrackError::Rejected("width".into()));
                }
            }
            self.reported.lock().unwrap().merge(&constraints.advanced);
            Ok(())
        }

        fn stop(&self) {}
    }

    fn brightness_caps() -> Capabilities {
        Capabilities::builder()
            .range(Attribute::Brightness, CapabilityRange::bounded(-64.0, 64.0))
            .unwrap()
            .range(Attribute::Contrast, CapabilityRange::bounded(0.0, 100.0))
            .unwrap()
            .modes(Attribute::FocusMode, [ManualMode::Manual, ManualMode::Continuous])
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn out_of_range_brightness_is_clamped() {
        let coordinator = CameraCoordinator::new();
        let track = Arc::new(MockTrack::with_caps(brightness_caps()));
        coordinator.set_track(track.clone());
        let applied = coordinator
            .apply_patch(&CameraSettings::default().with(Attribute::Brightness, 9999.0))
            .await
            .expect("apply");
        assert_eq!(applied.brightness, 64.0);
        assert_eq!(coordinator.desired().brightness, Some(64.0));
        assert_eq!(track.log()[0].advanced.brightness, Some(64.0));
    }

    #[tokio::test]
    async fn overlapping_patches_apply_in_submission_order() {
        let coordinator = CameraCoordinator::new();
        let track = Arc::new(MockTrack::with_caps(brightness_caps()));
        coordinator.set_track(track.clone());

        let p1 = CameraSettings::default().with(Attribute::Brightness, 1.0);
        let p2 = CameraSettings::default().with(Attribute::Brightness, 2.0);
        let p3 = CameraSettings::default().with(Attribute::Brightness, 3.0);
        let (r1, r2, r3) = tokio::join!(
            coordinator.apply_patch(&p1),
            coordinator.apply_patch(&p2),
            coordinator.apply_patch(&p3),
        );
        assert!(r1.is_ok() && r2.is_ok() && r3.is_ok());

        let order: Vec<_> = track
            .log()
            .iter()
            .map(|c| c.advanced.brightness.unwrap())
            .collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
        assert_eq!(track.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.applied().unwrap().brightness, 3.0);
    }

    #[tokio::test]
    async fn rejection_reaches_only_the_triggering_call() {
        let coordinator = CameraCoordinator::new();
        let track = Arc::new(MockTrack {
            reject_contrast_above: Some(80.0),
            ..MockTrack::with_caps(brightness_caps())
        });
        coordinator.set_track(track.clone());

        let bad = CameraSettings::default().with(Attribute::Contrast, 90.0);
        let err = coordinator.apply_patch(&bad).await.unwrap_err();
        match err {
            CoordinatorError::Rejected { applied, .. } => assert_eq!(applied.contrast, 90.0),
            other => panic!("unexpected error: {other:?}"),
        }
        // the rejected request is remembered
        assert_eq!(coordinator.desired().contrast, Some(90.0));

        let good = CameraSettings::default().with(Attribute::Contrast, 50.0);
        let applied = coordinator.apply_patch(&good).await.expect("later patch");
        assert_eq!(applied.contrast, 50.0);
        assert_eq!(track.log().len(), 2);
    }

    #[tokio::test]
    async fn unsupported_attributes_are_kept_but_not_sent() {
        let coordinator = CameraCoordinator::new();
        let track = Arc::new(MockTrack::with_caps(brightness_caps()));
        coordinator.set_track(track.clone());
        let patch = CameraSettings::default()
            .with(Attribute::ColorTemperature, 4500.0)
            .with(Attribute::Brightness, 3.0);
        let applied = coordinator.apply_patch(&patch).await.unwrap();

        let sent = &track.log()[0];
        assert_eq!(sent.advanced.color_temperature, None);
        assert_eq!(sent.advanced.brightness, Some(3.0));
        // focus mode is declared, exposure/white balance modes are not
        assert_eq!(sent.advanced.focus_mode, Some(ManualMode::Manual));
        assert_eq!(sent.advanced.exposure_mode, None);
        assert_eq!(coordinator.desired().color_temperature, Some(4500.0));
        assert_eq!(applied.color_temperature, 4500.0);
    }

    #[tokio::test]
    async fn unreported_capabilities_send_everything_unclamped() {
        let coordinator = CameraCoordinator::new();
        let track = Arc::new(MockTrack::default());
        coordinator.set_track(track.clone());
        let patch = CameraSettings::default()
            .with(Attribute::Brightness, 9999.0)
            .with(Attribute::Width, 1280.0)
            .with(Attribute::Height, 720.0);
        coordinator.apply_patch(&patch).await.unwrap();
        let sent = &track.log()[0];
        assert_eq!(sent.advanced.brightness, Some(9999.0));
        assert_eq!(sent.advanced.exposure_mode, Some(ManualMode::Manual));
        assert_eq!(sent.width, Some(SizeConstraint::Exact(1280)));
        assert_eq!(sent.height, Some(SizeConstraint::Exact(720)));
    }

    #[tokio::test]
    async fn desired_is_published_before_applied() {
        let coordinator = CameraCoordinator::new();
        coordinator.set_track(Arc::new(MockTrack::with_caps(brightness_caps())));
        let mut desired_rx = coordinator.subscribe_desired();
        let mut applied_rx = coordinator.subscribe_applied();

        let patch = CameraSettings::default().with(Attribute::Brightness, 5.0);
        let fut = coordinator.apply_patch(&patch);
        tokio::pin!(fut);
        // first poll merges and publishes desired, then parks on the track
        tokio::select! {
            biased;
            _ = &mut fut => panic!("apply should still be in flight"),
            changed = desired_rx.changed() => changed.unwrap(),
        }
        assert_eq!(desired_rx.borrow().brightness, Some(5.0));
        assert!(applied_rx.borrow().is_none());

        fut.await.unwrap();
        applied_rx.changed().await.unwrap();
        assert_eq!(applied_rx.borrow().as_ref().unwrap().brightness, 5.0);
    }

    #[tokio::test]
    async fn replaced_track_results_are_not_published() {
        let coordinator = CameraCoordinator::new();
        let old = Arc::new(MockTrack::with_caps(brightness_caps()));
        coordinator.set_track(old.clone());

        let patch = CameraSettings::default().with(Attribute::Brightness, 7.0);
        let fut = coordinator.apply_patch(&patch);
        tokio::pin!(fut);
        tokio::select! {
            biased;
            _ = &mut fut => panic!("apply should still be in flight"),
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
        }
        let replaced = coordinator.set_track(Arc::new(MockTrack::with_caps(brightness_caps())));
        assert!(replaced.is_some());

        let applied = fut.await.unwrap();
        assert_eq!(applied.brightness, 7.0);
        assert!(coordinator.applied().is_none());
        assert_eq!(old.log().len(), 1);
    }

    #[tokio::test]
    async fn refused_settings_stay_out_of_the_desired_state() {
        let coordinator = CameraCoordinator::new();
        let track = Arc::new(MockTrack {
            reject_contrast_above: Some(80.0),
            ..MockTrack::with_caps(brightness_caps())
        });
        coordinator.set_track(track.clone());

        let refused = CameraSettings::default().with(Attribute::Contrast, 90.0);
        assert!(matches!(
            coordinator.apply_settings(&refused).await,
            Err(CoordinatorError::Rejected { .. })
        ));
        assert_eq!(coordinator.desired().contrast, None);

        let accepted = CameraSettings::default().with(Attribute::Brightness, 99.0);
        let applied = coordinator.apply_settings(&accepted).await.unwrap();
        assert_eq!(applied.brightness, 64.0);
        let sent = track.log();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].advanced.brightness, Some(64.0));
        assert_eq!(sent[1].advanced.contrast, None);
        assert_eq!(coordinator.desired().brightness, Some(64.0));
    }

    #[tokio::test]
    async fn settings_need_a_track() {
        let coordinator = CameraCoordinator::new();
        let patch = CameraSettings::default().with(Attribute::Brightness, 1.0);
        assert!(matches!(
            coordinator.apply_settings(&patch).await,
            Err(CoordinatorError::NoTrack)
        ));
        assert_eq!(coordinator.desired(), CameraSettings::manual_modes());
    }

    #[tokio::test]
    async fn patch_without_track_still_yields_complete_state() {
        let coordinator = CameraCoordinator::new();
        let applied = coordinator
            .apply_patch(&CameraSettings::default().with(Attribute::FocusDistance, 300.0))
            .await
            .unwrap();
        assert_eq!(applied.focus_distance, 300.0);
        assert_eq!(applied.exposure_mode, ManualMode::Manual);
        assert!(matches!(
            coordinator.apply_constraints(&Constraints::default()).await,
            Err(CoordinatorError::NoTrack)
        ));
    }

    #[tokio::test]
    async fn resolution_updates_desired_only_on_success() {
        let coordinator = CameraCoordinator::new();
        coordinator.set_track(Arc::new(MockTrack::with_caps(brightness_caps())));

        let applied = coordinator
            .apply_resolution(Resolution::new(1280, 720))
            .await
            .unwrap();
        assert_eq!(applied.width, 1280.0);
        assert_eq!(coordinator.desired().height, Some(720.0));

        let err = coordinator
            .apply_resolution(Resolution::new(9999, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ResolutionUnsupported(ref r) if r == "9999x1"));
        assert_eq!(coordinator.desired().width, Some(1280.0));
    }
}
