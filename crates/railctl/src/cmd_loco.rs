use std::collections::BTreeMap;

use anyhow::Result;
use dccex::{LocoStore, LocomotiveState};

use crate::common;
use crate::config::Settings;

/// Show stored locomotive records, all of them or one address.
pub fn run(settings: &Settings, address: Option<u16>, json: bool) -> Result<()> {
    let locos = LocoStore::new(common::open_store(settings), settings.throttle.storage_key.clone());
    let records: BTreeMap<u16, LocomotiveState> = match address {
        Some(address) => BTreeMap::from([(address, locos.load(address))]),
        None => locos.load_all(),
    };

    if json {
        return common::print_json(&records);
    }
    if records.is_empty() {
        println!("No locomotives stored in {}.", settings.state_file.display());
        return Ok(());
    }
    println!(
        "{:<8} {:<6} {:<10} {:<8} {}",
        "ADDRESS", "SPEED", "DIRECTION", "INVERT", "FUNCTIONS"
    );
    for (address, state) in &records {
        let functions: Vec<String> = state.functions.iter().map(|f| format!("F{f}")).collect();
        println!(
            "{address:<8} {:<6} {:<10} {:<8} {}",
            state.speed,
            state.direction.to_string(),
            if state.invert_display { "yes" } else { "no" },
            functions.join(" "),
        );
    }
    Ok(())
}
