use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use camcaps::Attribute;
use camcoord::sim::{SimCamera, SimulatedDevices};
use camcoord::{CameraController, CameraCoordinator, CameraSettings, ControlSettings};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let devices = SimulatedDevices::new(vec![
        SimCamera::new("cam0", "Trust Webcam")
            .rejecting(Attribute::ColorTemperature)
            .with_delay(Duration::from_millis(20)),
        SimCamera::new("cam1", "Integrated Camera"),
    ]);
    let coordinator = Arc::new(CameraCoordinator::new());
    let mut controller = CameraController::new(
        coordinator.clone(),
        Arc::new(devices.clone()),
        ControlSettings::default(),
    );

    let mut applied_updates = coordinator.subscribe_applied();
    tokio::spawn(async move {
        while applied_updates.changed().await.is_ok() {
            if let Some(state) = applied_updates.borrow_and_update().clone() {
                println!(
                    "  applied: focus {} exposure {} brightness {}",
                    state.focus_distance, state.exposure_time, state.brightness
                );
            }
        }
    });

    for device in controller.cameras().await? {
        println!("== {} ==", device.label);
        let resolution = controller.select_camera(&device).await?;
        info!(?resolution, manual = controller.is_manual_capable(), "camera selected");

        controller.set_focus_distance(2000.0).await?;
        controller.step_exposure(2).await?;
        controller.set_brightness(-80.0).await?;
        println!("shutter {}", controller.shutter_label());

        // Concurrent patches are applied one at a time in submission order.
        let low = CameraSettings::default().with(Attribute::Contrast, 10.0);
        let high = CameraSettings::default().with(Attribute::Contrast, 90.0);
        let (first, second) = tokio::join!(coordinator.apply_patch(&low), coordinator.apply_patch(&high));
        println!("contrast {} then {}", first?.contrast, second?.contrast);

        // A refused attribute fails its own call; the desired state keeps it.
        let warm = CameraSettings::default().with(Attribute::ColorTemperature, 4000.0);
        let refused = coordinator.apply_patch(&warm).await;
        if let Err(err) = refused {
            warn!(error = %err, "colour temperature refused");
        }
        println!("desired colour temperature {:?}", coordinator.desired().color_temperature);
    }
    Ok(())
}
