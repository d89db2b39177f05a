use std::io;

use thiserror::Error;

/// Errors raised by the DCC-EX session and throttle.
#[derive(Debug, Error)]
pub enum DccError {
    /// A command was sent without an open write channel.
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    /// No serial device was granted (none selected, busy or denied).
    #[error("serial port unavailable: {0}")]
    PortUnavailable(String),
    /// The device could not be opened at the requested baud rate.
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("failed to close serial port: {0}")]
    Close(String),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("locomotive address {0} outside 1..=10239")]
    InvalidAddress(i64),
    #[error("function {0} outside 0..=28")]
    InvalidFunction(u8),
}

/// Errors raised by a key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
