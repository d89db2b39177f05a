//! Minimal simulated DCC-EX command station.
//!
//! Serves the far end of a [`crate::transport::PipeProvider`] pipe: it reads
//! command lines and answers the way a real station does for the commands the
//! throttle sends.

use std::collections::BTreeMap;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing::{debug, trace};

/// Version banner returned for `<s>`.
pub const BANNER: &str = "<iDCC-EX V-5.0.0 / SIMULATED / STANDARD_MOTOR_SHIELD G-railcam>";

/// Observable state of the simulated station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationState {
    pub power: bool,
    /// Speed and direction bit per cab.
    pub cabs: BTreeMap<u16, (u8, u8)>,
    pub commands: Vec<String>,
}

/// Reply for one command line, if the station sends one.
pub fn reply(line: &str, state: &mut StationState) -> Option<String> {
    state.commands.push(line.to_string());
    let body = line.strip_prefix('<')?.strip_suffix('>')?;
    let mut parts = body.split_whitespace();
    match parts.next()? {
        "1" => {
            state.power = true;
            Some("<p1>".into())
        }
        "0" => {
            state.power = false;
            Some("<p0>".into())
        }
        "s" => Some(format!("<p{}>\n{BANNER}", u8::from(state.power))),
        "t" => {
            let fields: Vec<u16> = parts.filter_map(|p| p.parse().ok()).collect();
            let [register, cab, speed, direction] = fields[..] else {
                return Some("<X>".into());
            };
            let (Ok(speed), Ok(direction)) = (u8::try_from(speed), u8::try_from(direction)) else {
                return Some("<X>".into());
            };
            state.cabs.insert(cab, (speed, direction));
            Some(format!("<T {register} {speed} {direction}>"))
        }
        "e" => {
            for cab in state.cabs.values_mut() {
                cab.0 = 0;
            }
            None
        }
        "F" => None,
        _ => Some("<X>".into()),
    }
}

/// Serve the station side of `stream` until the session hangs up.
pub async fn serve(stream: DuplexStream) -> StationState {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    let mut state = StationState::default();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        trace!(command = %line, "station rx");
        if let Some(answer) = reply(&line, &mut state) {
            if write.write_all(format!("{answer}\n").as_bytes()).await.is_err() {
                break;
            }
        }
    }
    debug!(commands = state.commands.len(), "simulated station closed");
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_like_a_station() {
        let mut state = StationState::default();
        assert_eq!(reply("<1>", &mut state).as_deref(), Some("<p1>"));
        assert!(state.power);
        assert_eq!(
            reply("<t 1 3 42 1>", &mut state).as_deref(),
            Some("<T 1 42 1>")
        );
        assert_eq!(state.cabs.get(&3), Some(&(42, 1)));
        assert_eq!(reply("<F 3 0 1>", &mut state), None);
        assert_eq!(reply("<e>", &mut state), None);
        assert_eq!(state.cabs.get(&3), Some(&(0, 1)));
        assert_eq!(reply("<t 1>", &mut state).as_deref(), Some("<X>"));
        // speed 300 does not fit a byte and must not wrap to 44
        assert_eq!(reply("<t 1 3 300 1>", &mut state).as_deref(), Some("<X>"));
        assert_eq!(state.cabs.get(&3), Some(&(0, 1)));
        assert_eq!(reply("garbage", &mut state), None);
        assert_eq!(state.commands.len(), 7);
    }
}
