use std::error::Error;

use camcoord::negotiate;
use camcoord::sim::{SimCamera, SimulatedDevices};
use camcoord::track::video_inputs;
use camdefs::{pick_default, Resolution};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let devices = SimulatedDevices::new(vec![
        SimCamera::new("cam0", "Trust Webcam"),
        SimCamera::new("cam1", "Integrated Camera")
            .supporting([Resolution::new(1920, 1080), Resolution::new(640, 480)]),
        SimCamera::new("cam2", "Document Camera").supporting([Resolution::new(2592, 1944)]),
    ]);

    for device in video_inputs(&devices).await? {
        let supported = negotiate::probe(&devices, Some(device.device_id.as_str())).await;
        let pick = pick_default(&supported);
        let listed: Vec<String> = supported.iter().map(ToString::to_string).collect();
        println!(
            "{:<20} supports [{}] -> default {}",
            device.label,
            listed.join(", "),
            pick.map_or_else(|| "none".to_string(), |r| r.to_string())
        );

        debug!(device = %device.device_id, ?pick, "acquiring default resolution");
        let track = negotiate::acquire(&devices, Some(device.device_id.as_str()), pick).await?;
        let settings = track.settings()?;
        println!(
            "{:<20} stream opened at {:?}x{:?}",
            "",
            settings.width,
            settings.height
        );
        track.stop();
    }

    println!("tracks still live: {}", devices.live_tracks());
    Ok(())
}
