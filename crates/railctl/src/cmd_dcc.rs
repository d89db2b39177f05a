use std::collections::BTreeSet;

use anyhow::{Context, Result};
use dccex::{Direction, Throttle};
use serde::Serialize;
use tracing::info;

use crate::common::{self, REPLY_WINDOW};
use crate::config::Settings;

/// One throttle operation sent over a fresh connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Power(bool),
    Speed(i64),
    Direction(Direction),
    ToggleDirection,
    Function(u8),
    Status,
    EmergencyStop,
    Send(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    address: u16,
    speed: u8,
    direction: Direction,
    functions: BTreeSet<u8>,
    track_power: bool,
    responses: Vec<String>,
}

impl Report {
    fn new(throttle: &Throttle, responses: Vec<String>) -> Self {
        Self {
            address: throttle.address(),
            speed: throttle.speed(),
            direction: throttle.direction(),
            functions: throttle.functions().clone(),
            track_power: throttle.session().track_power(),
            responses,
        }
    }
}

pub async fn run(settings: &Settings, address: Option<i64>, action: Action, json: bool) -> Result<()> {
    let link = common::connect(settings).await?;
    let mut responses = link.session.subscribe_responses();
    let mut throttle = match common::open_throttle(settings, link.session.clone(), address) {
        Ok(throttle) => throttle,
        Err(err) => {
            link.close().await?;
            return Err(err);
        }
    };

    let outcome = perform(&mut throttle, &action).await;
    let lines = common::collect_responses(&mut responses, REPLY_WINDOW).await;
    let report = Report::new(&throttle, lines);
    link.close().await?;
    outcome?;

    if json {
        return common::print_json(&report);
    }
    for line in &report.responses {
        println!("{line}");
    }
    let functions: Vec<String> = report.functions.iter().map(|f| format!("F{f}")).collect();
    println!(
        "loco {:<5} speed {:<3} {:<8} power {:<3} {}",
        report.address,
        report.speed,
        report.direction.to_string(),
        if report.track_power { "on" } else { "off" },
        functions.join(" "),
    );
    Ok(())
}

async fn perform(throttle: &mut Throttle, action: &Action) -> Result<()> {
    info!(address = throttle.address(), ?action, "throttle action");
    match action {
        Action::Power(on) => throttle
            .set_track_power(*on)
            .await
            .context("switch track power")?,
        Action::Speed(speed) => throttle.set_speed(*speed).await.context("set speed")?,
        Action::Direction(direction) => throttle
            .set_direction(*direction)
            .await
            .context("set direction")?,
        Action::ToggleDirection => throttle
            .toggle_direction()
            .await
            .context("reverse direction")?,
        Action::Function(function) => {
            let on = throttle
                .toggle_function(*function)
                .await
                .with_context(|| format!("toggle F{function}"))?;
            info!(function, on, "function toggled");
        }
        Action::Status => throttle.status().await.context("request status")?,
        Action::EmergencyStop => throttle
            .emergency_stop()
            .await
            .context("emergency stop")?,
        Action::Send(text) => throttle
            .send_raw(text)
            .await
            .with_context(|| format!("send {text}"))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;

    fn simulated(state_file: &str) -> Settings {
        Settings::load(
            None,
            Overrides {
                simulate: true,
                state_file: Some(std::env::temp_dir().join(state_file)),
                ..Overrides::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn speed_is_remembered_between_invocations() {
        let settings = simulated(&format!("railctl-speed-{}.json", std::process::id()));
        run(&settings, Some(42), Action::Speed(300), true).await.unwrap();
        run(&settings, Some(42), Action::ToggleDirection, true)
            .await
            .unwrap();

        let link = common::connect(&settings).await.unwrap();
        let throttle = common::open_throttle(&settings, link.session.clone(), Some(42)).unwrap();
        assert_eq!(throttle.speed(), 126);
        assert_eq!(throttle.direction(), Direction::Backward);
        link.close().await.unwrap();
        let _ = std::fs::remove_file(&settings.state_file);
    }

    #[tokio::test]
    async fn invalid_address_is_reported() {
        let settings = simulated(&format!("railctl-addr-{}.json", std::process::id()));
        let err = run(&settings, Some(0), Action::Status, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("select locomotive 0"));
    }
}
