//! Serial transport abstraction.
//!
//! A [`PortProvider`] grants exclusive access to one serial device. The
//! device is opened at a baud rate and then hands out its read and write
//! halves exactly once each.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

use crate::error::DccError;

/// Read half of an open serial device.
pub type PortReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of an open serial device.
pub type PortWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One serial device, exclusively held by a session.
#[async_trait]
pub trait SerialDevice: Send {
    /// Human readable device name.
    fn name(&self) -> &str;
    async fn open(&mut self, baud_rate: u32) -> Result<(), DccError>;
    /// Read half; `None` once taken or when the device is not readable.
    fn take_reader(&mut self) -> Option<PortReader>;
    /// Write half; `None` once taken or when the device is not writable.
    fn take_writer(&mut self) -> Option<PortWriter>;
    async fn close(&mut self) -> Result<(), DccError>;
}

/// Source of serial devices.
#[async_trait]
pub trait PortProvider: Send + Sync {
    async fn request_port(&self) -> Result<Box<dyn SerialDevice>, DccError>;
}

/// In-memory device backed by a [`tokio::io::duplex`] pipe.
///
/// The other end of the pipe plays the command station.
pub struct PipeDevice {
    name: String,
    stream: Option<DuplexStream>,
    reader: Option<PortReader>,
    writer: Option<PortWriter>,
    fail_open: bool,
}

impl PipeDevice {
    pub fn new(name: impl Into<String>, stream: DuplexStream) -> Self {
        Self {
            name: name.into(),
            stream: Some(stream),
            reader: None,
            writer: None,
            fail_open: false,
        }
    }

    /// Device whose `open` fails, as a busy port would.
    pub fn busy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream: None,
            reader: None,
            writer: None,
            fail_open: true,
        }
    }
}

impl fmt::Debug for PipeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeDevice")
            .field("name", &self.name)
            .field("open", &(self.reader.is_some() || self.writer.is_some()))
            .field("fail_open", &self.fail_open)
            .finish()
    }
}

#[async_trait]
impl SerialDevice for PipeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self, baud_rate: u32) -> Result<(), DccError> {
        let stream = match self.stream.take() {
            Some(stream) if !self.fail_open => stream,
            _ => {
                return Err(DccError::Open {
                    port: self.name.clone(),
                    reason: format!("device busy at {baud_rate} baud"),
                })
            }
        };
        let (reader, writer) = tokio::io::split(stream);
        self.reader = Some(Box::new(reader));
        self.writer = Some(Box::new(writer));
        Ok(())
    }

    fn take_reader(&mut self) -> Option<PortReader> {
        self.reader.take()
    }

    fn take_writer(&mut self) -> Option<PortWriter> {
        self.writer.take()
    }

    async fn close(&mut self) -> Result<(), DccError> {
        self.reader = None;
        self.writer = None;
        Ok(())
    }
}

/// Provider handing out queued [`PipeDevice`]s, one per request.
#[derive(Debug, Clone, Default)]
pub struct PipeProvider {
    devices: Arc<Mutex<Vec<PipeDevice>>>,
}

impl PipeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a device for the next `request_port`.
    pub fn push(&self, device: PipeDevice) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
    }

    /// Queue a fresh pipe and return the command-station end.
    pub fn attach(&self, name: impl Into<String>, buffer: usize) -> DuplexStream {
        let (device_end, station_end) = tokio::io::duplex(buffer);
        self.push(PipeDevice::new(name, device_end));
        station_end
    }
}

#[async_trait]
impl PortProvider for PipeProvider {
    async fn request_port(&self) -> Result<Box<dyn SerialDevice>, DccError> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        if devices.is_empty() {
            return Err(DccError::PortUnavailable("no port selected".into()));
        }
        Ok(Box::new(devices.remove(0)))
    }
}
