#![cfg_attr(docsrs, feature(doc_cfg))]
//! Camera state coordination.
//!
//! A [`CameraCoordinator`] keeps the operator's desired camera settings,
//! clamps them against what the attached track reports, and applies them one
//! request at a time so concurrent patches never race on the device. Hardware
//! refusals are absorbed: the desired state survives them and the applied
//! state falls back to it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use camcaps::Attribute;
//! use camcoord::{CameraCoordinator, CameraSettings, MediaDevices, StreamRequest};
//! use camcoord::sim::{SimCamera, SimulatedDevices};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let devices = SimulatedDevices::new(vec![SimCamera::new("cam0", "Trust Webcam")]);
//! let coordinator = CameraCoordinator::new();
//! coordinator.set_track(devices.acquire(&StreamRequest::default()).await?);
//! let applied = coordinator
//!     .apply_patch(&CameraSettings::default().with(Attribute::Brightness, 9999.0))
//!     .await?;
//! assert_eq!(applied.brightness, 64.0);
//! # Ok(())
//! # }
//! ```

pub mod controls;
pub mod coordinator;
pub mod negotiate;
pub mod sim;
pub mod state;
pub mod track;

use thiserror::Error;

pub use controls::{CameraController, ControlSettings};
pub use coordinator::CameraCoordinator;
pub use state::{AppliedCameraState, CameraSettings, DesiredCameraState};
pub use track::{
    video_inputs, Constraints, DeviceInfo, DeviceKind, MediaDevices, SizeConstraint,
    StreamRequest, Track, TrackError,
};

/// Error type produced by the coordinator and the controls built on it.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The hardware refused the apply this call triggered. The applied state
    /// published for it is attached.
    #[error("constraints rejected by hardware: {source}")]
    Rejected {
        #[source]
        source: TrackError,
        applied: Box<AppliedCameraState>,
    },
    /// The device cannot deliver the requested resolution.
    #[error("resolution {0} not supported")]
    ResolutionUnsupported(String),
    /// The string is not one of the candidate resolutions.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),
    /// No track is attached.
    #[error("no camera track attached")]
    NoTrack,
    #[error(transparent)]
    Track(#[from] TrackError),
}
