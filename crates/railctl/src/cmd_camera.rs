use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use camcaps::Attribute;
use camcoord::sim::{SimCamera, SimulatedDevices};
use camcoord::{AppliedCameraState, CameraController, CameraCoordinator, ControlSettings};
use camdefs::{
    format_as_fraction, is_manual_capable, manual_default, manual_limit, pick_default, Resolution,
    StopIndex, EXPOSURE_STOPS_US,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::common;

#[derive(Serialize)]
struct Stop {
    index: usize,
    microseconds: u32,
    label: String,
}

impl From<StopIndex> for Stop {
    fn from(stop: StopIndex) -> Self {
        Self {
            index: stop.get(),
            microseconds: stop.value_us(),
            label: stop.label(),
        }
    }
}

/// List the exposure ladder.
pub fn run_stops(json: bool) -> Result<()> {
    let stops: Vec<Stop> = (0..EXPOSURE_STOPS_US.len())
        .map(|idx| Stop::from(StopIndex::new(idx)))
        .collect();
    if json {
        return common::print_json(&stops);
    }
    println!("{:<6} {:<8} {}", "INDEX", "US", "SHUTTER");
    for stop in &stops {
        println!("{:<6} {:<8} {}", stop.index, stop.microseconds, stop.label);
    }
    Ok(())
}

/// Shutter fraction label for an arbitrary exposure time.
pub fn run_label(microseconds: f64, json: bool) -> Result<()> {
    let label = format_as_fraction(microseconds);
    if json {
        return common::print_json(&serde_json::json!({
            "microseconds": microseconds,
            "label": label,
        }));
    }
    println!("{label}");
    Ok(())
}

/// Snap an exposure time onto the ladder.
pub fn run_snap(microseconds: f64, json: bool) -> Result<()> {
    let stop = Stop::from(StopIndex::nearest(microseconds));
    if json {
        return common::print_json(&stop);
    }
    println!("{} us ({}), stop {}", stop.microseconds, stop.label, stop.index);
    Ok(())
}

/// Default capture resolution for a set of supported `WxH` values.
pub fn run_pick(supported: &[String], json: bool) -> Result<()> {
    let parsed = supported
        .iter()
        .map(|text| text.parse::<Resolution>())
        .collect::<Result<Vec<_>, _>>()
        .context("parse supported resolutions")?;
    let pick = pick_default(&parsed);
    if json {
        return common::print_json(&pick);
    }
    match pick {
        Some(resolution) => println!("{resolution}"),
        None => println!("No supported resolution."),
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManualAttribute {
    attribute: Attribute,
    default: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrustReport<'a> {
    label: &'a str,
    manual_capable: bool,
    attributes: Vec<ManualAttribute>,
}

/// Whether a device label selects manual control, and the manual table.
pub fn run_trust(label: &str, json: bool) -> Result<()> {
    let attributes = Attribute::ALL
        .iter()
        .copied()
        .filter_map(|attribute| {
            let limit = manual_limit(attribute)?;
            Some(ManualAttribute {
                attribute,
                default: manual_default(attribute),
                min: limit.min,
                max: limit.max,
            })
        })
        .collect();
    let report = TrustReport {
        label,
        manual_capable: is_manual_capable(label),
        attributes,
    };
    if json {
        return common::print_json(&report);
    }
    println!(
        "{label}: {}",
        if report.manual_capable {
            "manual control"
        } else {
            "automatic modes only"
        }
    );
    let show = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
    println!("{:<22} {:<8} {:<8} {}", "ATTRIBUTE", "DEFAULT", "MIN", "MAX");
    for entry in &report.attributes {
        println!(
            "{:<22} {:<8} {:<8} {}",
            entry.attribute.name(),
            show(entry.default),
            show(entry.min),
            show(entry.max),
        );
    }
    Ok(())
}

/// Parameters of a simulated controller session.
#[derive(Debug, Clone, Default)]
pub struct DemoArgs {
    pub label: String,
    pub supported: Vec<String>,
    pub reject: Vec<Attribute>,
    pub resolution: Option<String>,
    pub focus: Option<f64>,
    pub exposure: Option<f64>,
    pub brightness: Option<f64>,
    pub contrast: Option<f64>,
    pub compensation: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DemoReport {
    label: String,
    manual_capable: bool,
    available: Vec<Resolution>,
    resolution: Option<Resolution>,
    shutter: String,
    applied: Option<AppliedCameraState>,
    applies_sent: usize,
}

/// Run the manual controls against a simulated camera and report the outcome.
pub async fn run_demo(args: DemoArgs, json: bool) -> Result<()> {
    let mut camera = SimCamera::new("sim0", args.label.clone());
    if !args.supported.is_empty() {
        let supported = args
            .supported
            .iter()
            .map(|text| text.parse::<Resolution>())
            .collect::<Result<Vec<_>, _>>()
            .context("parse simulated resolutions")?;
        camera = camera.supporting(supported);
    }
    for attribute in &args.reject {
        camera = camera.rejecting(*attribute);
    }
    let devices = SimulatedDevices::new(vec![camera]);
    let mut controller = CameraController::new(
        Arc::new(CameraCoordinator::new()),
        Arc::new(devices.clone()),
        ControlSettings::default(),
    );

    let device = controller
        .cameras()
        .await
        .context("enumerate cameras")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("simulated camera missing"))?;
    controller
        .select_camera(&device)
        .await
        .with_context(|| format!("select {}", device.label))?;
    info!(label = %device.label, manual = controller.is_manual_capable(), "camera ready");

    if let Some(text) = &args.resolution {
        report("resolution", controller.apply_resolution(text).await);
    }
    if let Some(value) = args.focus {
        report("focus", controller.set_focus_distance(value).await);
    }
    if let Some(value) = args.exposure {
        report("exposure", controller.set_exposure_time(value).await);
    }
    if let Some(value) = args.brightness {
        report("brightness", controller.set_brightness(value).await);
    }
    if let Some(value) = args.contrast {
        report("contrast", controller.set_contrast(value).await);
    }
    if let Some(value) = args.compensation {
        report(
            "exposure compensation",
            controller.set_exposure_compensation(value).await,
        );
    }

    let summary = DemoReport {
        label: device.label.clone(),
        manual_capable: controller.is_manual_capable(),
        available: controller.available_resolutions().to_vec(),
        resolution: controller.resolution(),
        shutter: controller.shutter_label(),
        applied: controller.coordinator().applied(),
        applies_sent: devices
            .last_track()
            .map_or(0, |track| track.applied_log().len()),
    };
    if json {
        return common::print_json(&summary);
    }
    println!("camera      {}", summary.label);
    println!(
        "mode        {}",
        if summary.manual_capable { "manual" } else { "automatic" }
    );
    let available: Vec<String> = summary.available.iter().map(ToString::to_string).collect();
    println!("available   {}", available.join(" "));
    if let Some(resolution) = summary.resolution {
        println!("resolution  {resolution}");
    }
    println!("shutter     {}", summary.shutter);
    if let Some(applied) = &summary.applied {
        println!(
            "applied     focus {} ({}), exposure {} us ({}), brightness {}, contrast {}, compensation {}",
            applied.focus_distance,
            applied.focus_mode,
            applied.exposure_time,
            applied.exposure_mode,
            applied.brightness,
            applied.contrast,
            applied.exposure_compensation,
        );
    }
    println!("applies     {}", summary.applies_sent);
    Ok(())
}

fn report(step: &str, result: Result<Option<AppliedCameraState>, camcoord::CoordinatorError>) {
    match result {
        Ok(Some(_)) => info!(step, "applied"),
        Ok(None) => info!(step, "skipped: camera is not manually controllable"),
        Err(err) => warn!(step, error = %err, "camera refused the change"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_runs_for_trust_and_generic_cameras() {
        let trust = DemoArgs {
            label: "Trust Webcam".into(),
            resolution: Some("640x480".into()),
            brightness: Some(9999.0),
            reject: vec![Attribute::Contrast],
            contrast: Some(10.0),
            ..DemoArgs::default()
        };
        run_demo(trust, true).await.unwrap();

        let generic = DemoArgs {
            label: "Integrated Camera".into(),
            focus: Some(100.0),
            ..DemoArgs::default()
        };
        run_demo(generic, false).await.unwrap();
    }

    #[test]
    fn pick_rejects_malformed_input() {
        assert!(run_pick(&["1280x720".into(), "640x480".into()], true).is_ok());
        assert!(run_pick(&["wide".into()], false).is_err());
    }
}
