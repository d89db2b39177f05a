use anyhow::{Context, Result};
use tracing::info;

use crate::common;

pub fn run(json: bool) -> Result<()> {
    let ports = dccex::available_ports().context("enumerate serial ports")?;
    info!(count = ports.len(), "serial ports found");

    if json {
        return common::print_json(&ports);
    }
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    println!("{:<24} {}", "PORT", "TYPE");
    for port in &ports {
        println!("{:<24} {}", port.name, port.kind);
    }
    Ok(())
}
