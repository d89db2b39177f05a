//! Resolution negotiation: probe which candidates a device can deliver and
//! open the stream a controller will drive.

use std::sync::Arc;

use camdefs::{Resolution, CANDIDATE_RESOLUTIONS};
use tracing::{debug, info, warn};

use crate::track::{MediaDevices, StreamRequest, Track, TrackError};

/// Find which candidate resolutions `device_id` can deliver exactly.
///
/// Every candidate is attempted in descending order, whatever happened to the
/// previous ones. A successful trial capture is released immediately.
pub async fn probe(devices: &dyn MediaDevices, device_id: Option<&str>) -> Vec<Resolution> {
    let mut supported = Vec::new();
    for candidate in CANDIDATE_RESOLUTIONS {
        let request = StreamRequest::exact(device_id, candidate);
        match devices.acquire(&request).await {
            Ok(track) => {
                track.stop();
                debug!(resolution = %candidate, "resolution supported");
                supported.push(candidate);
            }
            Err(err) => {
                debug!(resolution = %candidate, error = %err, "resolution refused");
            }
        }
    }
    info!(
        device = device_id.unwrap_or("default"),
        count = supported.len(),
        "resolution probe finished"
    );
    supported
}

/// Open a stream at `resolution`, falling back from an exact request to a
/// preference for the same size.
///
/// With no resolution the device picks its own format.
pub async fn acquire(
    devices: &dyn MediaDevices,
    device_id: Option<&str>,
    resolution: Option<Resolution>,
) -> Result<Arc<dyn Track>, TrackError> {
    let Some(resolution) = resolution else {
        let request = StreamRequest {
            device_id: device_id.map(str::to_string),
            ..StreamRequest::default()
        };
        return devices.acquire(&request).await;
    };

    let exact = StreamRequest::exact(device_id, resolution);
    match devices.acquire(&exact).await {
        Ok(track) => Ok(track),
        Err(err) => {
            warn!(%resolution, error = %err, "exact acquisition refused; retrying as preference");
            devices.acquire(&exact.relaxed()).await
        }
    }
}
