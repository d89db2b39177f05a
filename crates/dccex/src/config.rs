//! Session and throttle configuration.

use serde::{Deserialize, Serialize};

/// Baud rate DCC-EX command stations listen on.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Storage key of the persisted locomotive map.
pub const DEFAULT_STORAGE_KEY: &str = "railcam-loco-states";

/// Serial session parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub baud_rate: u32,
    /// Bytes requested per read.
    pub read_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_buffer: 256,
        }
    }
}

/// Throttle parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThrottleConfig {
    pub storage_key: String,
    /// Address selected when the throttle starts.
    pub initial_address: u16,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            initial_address: 3,
        }
    }
}
