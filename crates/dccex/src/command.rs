//! DCC-EX command encoding.
//!
//! Every command is one ASCII line `<...>` terminated by a newline on the wire.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Lowest valid locomotive address.
pub const MIN_ADDRESS: u16 = 1;
/// Highest valid (long) locomotive address.
pub const MAX_ADDRESS: u16 = 10239;
/// Highest throttle speed step.
pub const MAX_SPEED: u8 = 126;
/// Highest function number.
pub const MAX_FUNCTION: u8 = 28;

/// Travel direction of a locomotive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }

    /// Direction bit of the throttle command.
    pub fn bit(self) -> u8 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => 0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        })
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" | "fwd" | "f" => Ok(Direction::Forward),
            "backward" | "reverse" | "rev" | "b" | "r" => Ok(Direction::Backward),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// Commands understood by a DCC-EX command station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `<1>` / `<0>`.
    TrackPower(bool),
    /// `<t 1 {address} {speed} {direction}>`.
    Throttle {
        address: u16,
        speed: u8,
        direction: Direction,
    },
    /// `<F {address} {function} {0|1}>`.
    Function { address: u16, function: u8, on: bool },
    /// `<s>`.
    Status,
    /// `<e>`.
    EmergencyStop,
    /// Operator-typed text, sent verbatim.
    Raw(String),
}

impl Command {
    /// Throttle command with the speed clamped to the valid range.
    pub fn throttle(address: u16, speed: u8, direction: Direction) -> Self {
        Command::Throttle {
            address,
            speed: speed.min(MAX_SPEED),
            direction,
        }
    }

    /// Wire bytes including the trailing newline.
    pub fn encode(&self) -> Bytes {
        encode_line(&self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::TrackPower(true) => f.write_str("<1>"),
            Command::TrackPower(false) => f.write_str("<0>"),
            Command::Throttle {
                address,
                speed,
                direction,
            } => write!(f, "<t 1 {address} {speed} {}>", direction.bit()),
            Command::Function {
                address,
                function,
                on,
            } => write!(f, "<F {address} {function} {}>", u8::from(*on)),
            Command::Status => f.write_str("<s>"),
            Command::EmergencyStop => f.write_str("<e>"),
            Command::Raw(text) => f.write_str(text),
        }
    }
}

/// Append the line terminator to `text`.
pub fn encode_line(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_formats() {
        assert_eq!(Command::TrackPower(true).to_string(), "<1>");
        assert_eq!(Command::TrackPower(false).to_string(), "<0>");
        assert_eq!(
            Command::throttle(3, 42, Direction::Forward).to_string(),
            "<t 1 3 42 1>"
        );
        assert_eq!(
            Command::throttle(10239, 200, Direction::Backward).to_string(),
            "<t 1 10239 126 0>"
        );
        let f = Command::Function {
            address: 3,
            function: 28,
            on: false,
        };
        assert_eq!(f.to_string(), "<F 3 28 0>");
        assert_eq!(Command::Status.to_string(), "<s>");
        assert_eq!(Command::EmergencyStop.to_string(), "<e>");
        assert_eq!(Command::Raw("<D CABS>".into()).to_string(), "<D CABS>");
    }

    #[test]
    fn encode_appends_newline() {
        assert_eq!(&Command::Status.encode()[..], b"<s>\n");
        assert_eq!(&encode_line("<D CABS>")[..], b"<D CABS>\n");
    }

    #[test]
    fn direction_helpers() {
        assert_eq!(Direction::default(), Direction::Forward);
        assert_eq!(Direction::Forward.reversed(), Direction::Backward);
        assert_eq!("REV".parse::<Direction>(), Ok(Direction::Backward));
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(
            serde_json::to_string(&Direction::Backward).unwrap(),
            "\"backward\""
        );
    }
}
